use std::env;

/// Configuration for language resolution and URL routing.
///
/// All request-facing names (query parameter, header, cookie) are
/// configurable; the defaults match the conventional wire surface:
/// `?lang=`, `?setLanguage=`, `Set-Language`, a `visitor` cookie.
#[derive(Debug, Clone)]
pub struct I18nConfig {
    /// Iso code of the fallback language. Must exist in the catalog.
    pub default_language: String,

    /// When false, URLs for the default language omit the `/<lang>` prefix.
    pub default_language_code_in_url: bool,

    /// Query parameter carrying the requested language.
    pub query_param: String,

    /// Query parameter that triggers an explicit language change.
    pub change_param: String,

    /// Header carrying the requested language.
    pub header_name: String,

    /// Form-body field carrying the requested language.
    pub body_param: String,

    /// Cookie holding the stable visitor identifier for the preference store.
    pub visitor_cookie: String,

    /// Route the site root resolves to.
    pub default_route: String,
}

impl I18nConfig {
    pub fn new(default_language: impl Into<String>) -> Self {
        Self {
            default_language: default_language.into(),
            default_language_code_in_url: false,
            query_param: "lang".to_string(),
            change_param: "setLanguage".to_string(),
            header_name: "set-language".to_string(),
            body_param: "lang".to_string(),
            visitor_cookie: "visitor".to_string(),
            default_route: "site/index".to_string(),
        }
    }

    /// Load configuration from environment variables.
    /// Panics with a clear message if I18N_DEFAULT_LANGUAGE is missing.
    pub fn from_env() -> Self {
        let mut config = Self::new(required_env("I18N_DEFAULT_LANGUAGE"));
        if let Ok(v) = env::var("I18N_DEFAULT_LANGUAGE_CODE_IN_URL") {
            config.default_language_code_in_url = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = env::var("I18N_DEFAULT_ROUTE") {
            config.default_route = v;
        }
        if let Ok(v) = env::var("I18N_VISITOR_COOKIE") {
            config.visitor_cookie = v;
        }
        config
    }

    /// The route the root path maps to. A bare controller default such as
    /// `site` normalizes to its index action.
    pub fn normalized_default_route(&self) -> String {
        if self.default_route.is_empty() || self.default_route == "site" {
            return "site/index".to_string();
        }
        self.default_route.clone()
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
