use regex::Regex;
use tracing::info;

use crate::config::I18nConfig;
use crate::error::I18nError;
use crate::resolver::ResolvedLanguage;

/// Path shapes covered by the table. Each shape is registered twice: once
/// with a `/<lang>` prefix and once without (binding the default language).
const SHAPES: [&[&str]; 5] = [
    &[],
    &["module", "controller"],
    &["module", "controller", "action"],
    &["controller"],
    &["controller", "action"],
];

const SEGMENT: &str = "[A-Za-z0-9_-]+";

#[derive(Debug, Clone, Copy, PartialEq)]
enum RouteTarget {
    /// The site root maps to the configured default route.
    DefaultRoute,
    /// The route is the matched path segments joined by `/`.
    Segments,
}

struct RouteRule {
    pattern: Regex,
    segments: &'static [&'static str],
    target: RouteTarget,
    /// Bound when the rule carries no `/<lang>` prefix.
    lang_default: Option<String>,
}

/// A successful path match: the application route plus the `lang` parameter
/// the rule extracted or defaulted.
///
/// `lang_from_path` distinguishes a captured `/<lang>` prefix from a rule
/// default. Only a captured prefix counts as an explicit language signal;
/// the bound default must not shadow header or body signals.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch {
    pub route: String,
    pub lang: String,
    pub lang_from_path: bool,
}

/// Language-aware routing table.
///
/// Built once at startup from the active language catalog. Non-default
/// languages are folded into a single regex alternation per shape, so the
/// matching table stays linear in route shapes, not shapes × languages.
/// Prefixed rules are registered first: an explicit `/es/...` path must
/// never be captured by an un-prefixed default-language rule.
pub struct RouteTable {
    rules: Vec<RouteRule>,
    supported: Vec<String>,
    default_language: String,
    default_in_url: bool,
    default_route: String,
    lang_param: String,
}

impl RouteTable {
    pub fn new(config: &I18nConfig, supported: &[String]) -> Result<Self, I18nError> {
        if supported.is_empty() {
            return Err(I18nError::Config(
                "cannot build route table without supported languages".to_string(),
            ));
        }

        let prefixed: Vec<&String> = if config.default_language_code_in_url {
            supported.iter().collect()
        } else {
            supported
                .iter()
                .filter(|c| **c != config.default_language)
                .collect()
        };

        let mut rules = Vec::new();

        if !prefixed.is_empty() {
            let alternation = prefixed
                .iter()
                .map(|c| regex::escape(c))
                .collect::<Vec<_>>()
                .join("|");
            for shape in SHAPES {
                rules.push(RouteRule {
                    pattern: compile(Some(&alternation), shape),
                    segments: shape,
                    target: target_of(shape),
                    lang_default: None,
                });
            }
        }

        // Un-prefixed counterparts bind the default language. Registered
        // last so they only catch paths without a language prefix.
        for shape in SHAPES {
            rules.push(RouteRule {
                pattern: compile(None, shape),
                segments: shape,
                target: target_of(shape),
                lang_default: Some(config.default_language.clone()),
            });
        }

        info!(
            rules = rules.len(),
            languages = supported.len(),
            "built language route table"
        );

        Ok(Self {
            rules,
            supported: supported.to_vec(),
            default_language: config.default_language.clone(),
            default_in_url: config.default_language_code_in_url,
            default_route: config.normalized_default_route(),
            lang_param: config.query_param.clone(),
        })
    }

    /// Match an incoming path against the table. First rule wins.
    pub fn match_path(&self, path: &str) -> Option<RouteMatch> {
        for rule in &self.rules {
            let Some(caps) = rule.pattern.captures(path) else {
                continue;
            };
            let captured = caps.name("lang").map(|m| m.as_str().to_string());
            let lang_from_path = captured.is_some();
            let lang = captured
                .or_else(|| rule.lang_default.clone())
                .unwrap_or_else(|| self.default_language.clone());
            let route = match rule.target {
                RouteTarget::DefaultRoute => self.default_route.clone(),
                RouteTarget::Segments => rule
                    .segments
                    .iter()
                    .map(|name| &caps[*name])
                    .collect::<Vec<_>>()
                    .join("/"),
            };
            return Some(RouteMatch {
                route,
                lang,
                lang_from_path,
            });
        }
        None
    }

    /// Build a URL for `route` in `lang`. The `/<lang>` prefix is omitted
    /// exactly when `lang` is the default language and the configuration
    /// keeps the default code out of URLs. Extra parameters become the
    /// query string. Returns `None` for unsupported languages and for
    /// routes no registered shape covers.
    pub fn url(&self, route: &str, lang: &str, params: &[(&str, &str)]) -> Option<String> {
        if !self.supported.iter().any(|c| c == lang) {
            return None;
        }

        let segments: Vec<&str> = if route == self.default_route {
            Vec::new()
        } else {
            let segments: Vec<&str> = route.split('/').collect();
            if segments.is_empty()
                || segments.len() > 3
                || segments.iter().any(|s| !is_segment(s))
            {
                return None;
            }
            segments
        };

        let mut url = String::new();
        if lang != self.default_language || self.default_in_url {
            url.push('/');
            url.push_str(lang);
        }
        for segment in &segments {
            url.push('/');
            url.push_str(segment);
        }
        if url.is_empty() {
            url.push('/');
        }

        let mut first = true;
        for (k, v) in params {
            if *k == self.lang_param {
                continue;
            }
            url.push(if first { '?' } else { '&' });
            url.push_str(k);
            url.push('=');
            url.push_str(v);
            first = false;
        }
        Some(url)
    }

    /// URL construction bound to a resolved request language.
    pub fn url_builder<'a>(&'a self, language: &'a ResolvedLanguage) -> UrlBuilder<'a> {
        UrlBuilder {
            table: self,
            language,
        }
    }
}

/// Builds outbound URLs, injecting the active language whenever the caller
/// did not pass the language parameter explicitly.
pub struct UrlBuilder<'a> {
    table: &'a RouteTable,
    language: &'a ResolvedLanguage,
}

impl UrlBuilder<'_> {
    pub fn url(&self, route: &str, params: &[(&str, &str)]) -> Option<String> {
        let lang = params
            .iter()
            .find(|(k, _)| *k == self.table.lang_param)
            .map(|(_, v)| *v)
            .unwrap_or(&self.language.active);
        self.table.url(route, lang, params)
    }
}

fn target_of(shape: &'static [&'static str]) -> RouteTarget {
    if shape.is_empty() {
        RouteTarget::DefaultRoute
    } else {
        RouteTarget::Segments
    }
}

fn compile(lang_alternation: Option<&str>, shape: &[&str]) -> Regex {
    let mut pattern = String::from("^");
    if let Some(alternation) = lang_alternation {
        pattern.push_str(&format!("/(?P<lang>{alternation})"));
    }
    for name in shape {
        pattern.push_str(&format!("/(?P<{name}>{SEGMENT})"));
    }
    if shape.is_empty() {
        pattern.push('/');
        if lang_alternation.is_some() {
            pattern.push('?');
        }
    }
    pattern.push('$');
    Regex::new(&pattern).unwrap_or_else(|e| panic!("invalid route pattern `{pattern}`: {e}"))
}

fn is_segment(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
