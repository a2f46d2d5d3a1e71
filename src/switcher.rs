use crate::catalog::CatalogCache;
use crate::config::I18nConfig;
use crate::error::I18nError;
use crate::resolver::{switch_url, ResolvedLanguage};
use crate::routes::RouteTable;

/// One language choice the widget offers.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitcherLink {
    pub iso_code: String,
    pub title: String,
    pub url: String,
    pub is_current: bool,
}

/// Presentation glue listing supported languages as links to the current
/// page in each language. Consumes only the catalog and the resolved
/// request language.
pub struct LanguageSwitcher<'a> {
    catalog: &'a CatalogCache,
    config: &'a I18nConfig,
    routes: Option<&'a RouteTable>,
}

impl<'a> LanguageSwitcher<'a> {
    pub fn new(catalog: &'a CatalogCache, config: &'a I18nConfig) -> Self {
        Self {
            catalog,
            config,
            routes: None,
        }
    }

    /// Generate clean `/<lang>/...` links when the current path is covered
    /// by the route table, instead of `?lang=` URLs.
    pub fn with_routes(mut self, routes: &'a RouteTable) -> Self {
        self.routes = Some(routes);
        self
    }

    /// One link per active language, preserving the current path and query.
    pub async fn links(
        &self,
        language: &ResolvedLanguage,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Vec<SwitcherLink>, I18nError> {
        let languages = self.catalog.supported(true).await?;
        let matched = self.routes.and_then(|r| r.match_path(path).map(|m| (r, m)));

        let links = languages
            .iter()
            .map(|l| {
                let url = match &matched {
                    Some((routes, m)) => {
                        let extra: Vec<(&str, &str)> = query
                            .iter()
                            .filter(|(k, _)| {
                                *k != self.config.query_param && *k != self.config.change_param
                            })
                            .map(|(k, v)| (k.as_str(), v.as_str()))
                            .collect();
                        routes
                            .url(&m.route, &l.iso_code, &extra)
                            .unwrap_or_else(|| switch_url(path, query, self.config, &l.iso_code))
                    }
                    None => switch_url(path, query, self.config, &l.iso_code),
                };
                SwitcherLink {
                    iso_code: l.iso_code.clone(),
                    title: l.title.clone(),
                    url,
                    is_current: l.iso_code == language.active,
                }
            })
            .collect();
        Ok(links)
    }

    /// Render the dropdown widget. The `data-language` attribute carries the
    /// iso code for click handlers that prefer navigating through the
    /// `setLanguage` directive.
    pub async fn render(
        &self,
        language: &ResolvedLanguage,
        path: &str,
        query: &[(String, String)],
    ) -> Result<String, I18nError> {
        let links = self.links(language, path, query).await?;

        let mut items = String::new();
        for link in &links {
            let class = if link.is_current { r#" class="current""# } else { "" };
            items.push_str(&format!(
                "<li{class}><a href=\"{}\" data-language=\"{}\" title=\"{}\">{}</a></li>\n",
                html_escape(&link.url),
                html_escape(&link.iso_code),
                html_escape(&link.title),
                link.iso_code.to_uppercase(),
            ));
        }

        Ok(format!(
            "<div id=\"lang-nav\" class=\"dropdown\">\n<a aria-haspopup=\"true\" aria-expanded=\"false\">{}</a>\n<ul class=\"dropdown-menu\">\n{items}</ul>\n</div>",
            html_escape(&language.active.to_uppercase()),
        ))
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
