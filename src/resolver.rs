use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::CatalogCache;
use crate::config::I18nConfig;
use crate::error::I18nError;
use crate::routes::RouteTable;

/// Crawler signature substrings, matched case-insensitively.
const BOT_SIGNATURES: [&str; 4] = ["bot", "crawl", "slurp", "spider"];

/// Whether a user agent belongs to a crawler. Crawlers never get their
/// preference persisted and never get the landing-page redirect, so cached
/// and crawled pages stay language-stable.
pub fn is_bot(user_agent: &str) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    BOT_SIGNATURES.iter().any(|sig| ua.contains(sig))
}

/// Durable per-visitor language preference, keyed by a stable visitor
/// identifier. Externally synchronized; last write wins. Failures are
/// treated as "no preference" by the resolver, never as request errors.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, visitor_id: &str) -> Result<Option<String>, I18nError>;
    async fn set(&self, visitor_id: &str, lang: &str) -> Result<(), I18nError>;
}

/// Everything the resolver reads from one incoming request.
///
/// `query` holds raw (un-decoded) pairs in order; parameters parsed out of a
/// language-prefixed path are prepended by the middleware, so a `/es/...`
/// prefix wins over a stray `?lang=` in the query string.
#[derive(Debug, Clone, Default)]
pub struct RequestSignals {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub header_language: Option<String>,
    pub body_language: Option<String>,
    pub user_agent: Option<String>,
    /// Background/asynchronous fetch (`X-Requested-With: XMLHttpRequest`).
    /// Suppresses the change directive so widget polling can't redirect.
    pub background_fetch: bool,
    pub visitor_id: Option<String>,
}

impl RequestSignals {
    /// First value for a query parameter, if present.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn from_bot(&self) -> bool {
        self.user_agent.as_deref().map(is_bot).unwrap_or(false)
    }
}

/// The language decided for one request. Inserted as a request extension by
/// the middleware and dropped at request end.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedLanguage {
    /// Language used for content lookup and URL generation.
    pub active: String,
    /// Configured fallback language.
    pub default: String,
    /// True when `active` came from an explicit request signal
    /// (query, header or body) rather than the configured default.
    pub explicit_change: bool,
}

/// Result of one resolution pass. Redirects are terminal: the middleware
/// must answer with the redirect and never run the inner handler.
#[derive(Debug, Clone)]
pub enum Outcome {
    Proceed(ResolvedLanguage),
    Redirect(String),
}

/// Decides the active language for each request.
///
/// Precedence, first match wins: explicit change directive (redirects),
/// query parameter, header, body field, configured default. Unsupported
/// values anywhere fall through to the next step, never error.
pub struct LanguageResolver {
    config: I18nConfig,
    catalog: Arc<CatalogCache>,
    preferences: Arc<dyn PreferenceStore>,
    routes: Option<Arc<RouteTable>>,
}

impl LanguageResolver {
    pub fn new(
        config: I18nConfig,
        catalog: Arc<CatalogCache>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            config,
            catalog,
            preferences,
            routes: None,
        }
    }

    /// Build redirect URLs through the routing table when the current path
    /// is covered by it, so a language prefix in the path gets rewritten
    /// instead of being contradicted by a `?lang=` parameter.
    pub fn with_routes(mut self, routes: Arc<RouteTable>) -> Self {
        self.routes = Some(routes);
        self
    }

    pub fn config(&self) -> &I18nConfig {
        &self.config
    }

    pub async fn resolve(&self, signals: &RequestSignals) -> Result<Outcome, I18nError> {
        let supported = self.catalog.iso_codes(true).await?;

        // 1. Explicit change directive. Suppressed for background fetches;
        //    the preference write is additionally suppressed for crawlers.
        if !signals.background_fetch {
            if let Some(target) = signals.query_value(&self.config.change_param) {
                if supported.iter().any(|c| c == target) {
                    let target = target.to_string();
                    if !signals.from_bot() {
                        self.remember(signals, &target).await;
                    }
                    let location = self.build_switch_url(signals, &target);
                    info!(lang = %target, %location, "explicit language change, redirecting");
                    return Ok(Outcome::Redirect(location));
                }
                debug!(value = %target, "ignoring unsupported change directive");
            }
        }

        // 2.-5. Query parameter, header, body field, configured default.
        let explicit = self.first_supported(signals, &supported);
        let resolved = ResolvedLanguage {
            active: explicit
                .clone()
                .unwrap_or_else(|| self.config.default_language.clone()),
            default: self.config.default_language.clone(),
            explicit_change: explicit.is_some(),
        };

        // A returning visitor's remembered choice wins over the default on
        // the first hit of the site root, but never over an explicit signal.
        if let Some(location) = self.landing_redirect(signals, &resolved, &supported).await {
            info!(%location, "remembered language differs, redirecting landing page");
            return Ok(Outcome::Redirect(location));
        }

        Ok(Outcome::Proceed(resolved))
    }

    /// First supported language among query parameter, header and body.
    fn first_supported(&self, signals: &RequestSignals, supported: &[String]) -> Option<String> {
        let candidates = [
            signals.query_value(&self.config.query_param),
            signals.header_language.as_deref(),
            signals.body_language.as_deref(),
        ];
        candidates
            .into_iter()
            .flatten()
            .find(|c| supported.iter().any(|s| s == c))
            .map(|c| c.to_string())
    }

    /// Persist the visitor's choice. Best-effort: a failing store is logged
    /// and ignored, preference personalization must never fail a request.
    async fn remember(&self, signals: &RequestSignals, lang: &str) {
        let Some(visitor) = signals.visitor_id.as_deref() else {
            return;
        };
        if let Err(e) = self.preferences.set(visitor, lang).await {
            warn!(error = %e, "failed to persist language preference");
        }
    }

    async fn landing_redirect(
        &self,
        signals: &RequestSignals,
        resolved: &ResolvedLanguage,
        supported: &[String],
    ) -> Option<String> {
        if signals.path != "/" || signals.from_bot() || resolved.explicit_change {
            return None;
        }
        let visitor = signals.visitor_id.as_deref()?;
        let preference = match self.preferences.get(visitor).await {
            Ok(preference) => preference?,
            Err(e) => {
                warn!(error = %e, "preference store unavailable, skipping landing redirect");
                return None;
            }
        };
        if preference == resolved.active || !supported.iter().any(|s| *s == preference) {
            return None;
        }
        Some(self.build_switch_url(signals, &preference))
    }

    /// Shared redirect URL rule: rebuild through the route table when the
    /// path is covered, otherwise keep the path and switch the `lang`
    /// query parameter.
    fn build_switch_url(&self, signals: &RequestSignals, target: &str) -> String {
        if let Some(routes) = &self.routes {
            if let Some(matched) = routes.match_path(&signals.path) {
                let extra: Vec<(&str, &str)> = signals
                    .query
                    .iter()
                    .filter(|(k, _)| *k != self.config.change_param && *k != self.config.query_param)
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                if let Some(url) = routes.url(&matched.route, target, &extra) {
                    return url;
                }
            }
        }
        switch_url(&signals.path, &signals.query, &self.config, target)
    }
}

/// Rebuild the current URL with the language switched: keep the path and all
/// query parameters, overwrite `lang` with the target and strip the change
/// directive. Shared by both redirect triggers and the switcher widget.
pub fn switch_url(
    path: &str,
    query: &[(String, String)],
    config: &I18nConfig,
    target: &str,
) -> String {
    let mut pairs: Vec<(&str, &str)> = query
        .iter()
        .filter(|(k, _)| *k != config.change_param && *k != config.query_param)
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    pairs.push((&config.query_param, target));

    let mut url = String::from(path);
    for (i, (k, v)) in pairs.iter().enumerate() {
        url.push(if i == 0 { '?' } else { '&' });
        url.push_str(k);
        url.push('=');
        url.push_str(v);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryCatalog, MemoryPreferenceStore};

    fn resolver(preferences: Arc<MemoryPreferenceStore>) -> LanguageResolver {
        let catalog = Arc::new(CatalogCache::new(Arc::new(MemoryCatalog::with_codes(&[
            "en", "fr", "es",
        ]))));
        LanguageResolver::new(I18nConfig::new("en"), catalog, preferences)
    }

    fn signals(path: &str, query: &[(&str, &str)]) -> RequestSignals {
        RequestSignals {
            path: path.to_string(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    async fn active(resolver: &LanguageResolver, signals: &RequestSignals) -> String {
        match resolver.resolve(signals).await.unwrap() {
            Outcome::Proceed(resolved) => resolved.active,
            Outcome::Redirect(location) => panic!("unexpected redirect to {location}"),
        }
    }

    #[tokio::test]
    async fn every_supported_language_resolves_from_query() {
        let resolver = resolver(Arc::new(MemoryPreferenceStore::new()));
        for lang in ["en", "fr", "es"] {
            let signals = signals("/shop", &[("lang", lang)]);
            assert_eq!(active(&resolver, &signals).await, lang);
        }
    }

    #[tokio::test]
    async fn query_beats_header_beats_body() {
        let resolver = resolver(Arc::new(MemoryPreferenceStore::new()));

        let mut s = signals("/shop", &[("lang", "fr")]);
        s.header_language = Some("es".to_string());
        s.body_language = Some("en".to_string());
        assert_eq!(active(&resolver, &s).await, "fr");

        let mut s = signals("/shop", &[]);
        s.header_language = Some("es".to_string());
        s.body_language = Some("en".to_string());
        assert_eq!(active(&resolver, &s).await, "es");

        let mut s = signals("/shop", &[]);
        s.body_language = Some("fr".to_string());
        assert_eq!(active(&resolver, &s).await, "fr");
    }

    #[tokio::test]
    async fn unsupported_values_fall_through_to_default() {
        let resolver = resolver(Arc::new(MemoryPreferenceStore::new()));
        let mut s = signals("/shop", &[("lang", "xx")]);
        s.header_language = Some("yy".to_string());
        assert_eq!(active(&resolver, &s).await, "en");
    }

    #[tokio::test]
    async fn change_directive_redirects_and_persists() {
        let preferences = Arc::new(MemoryPreferenceStore::new());
        let resolver = resolver(preferences.clone());

        let mut s = signals("/shop/view", &[("id", "7"), ("setLanguage", "es")]);
        s.visitor_id = Some("v-1".to_string());

        match resolver.resolve(&s).await.unwrap() {
            Outcome::Redirect(location) => assert_eq!(location, "/shop/view?id=7&lang=es"),
            Outcome::Proceed(_) => panic!("expected redirect"),
        }
        assert_eq!(preferences.stored("v-1"), Some("es".to_string()));
    }

    #[tokio::test]
    async fn change_directive_overwrites_existing_lang_param() {
        let resolver = resolver(Arc::new(MemoryPreferenceStore::new()));
        let s = signals("/shop", &[("lang", "en"), ("setLanguage", "fr")]);
        match resolver.resolve(&s).await.unwrap() {
            Outcome::Redirect(location) => assert_eq!(location, "/shop?lang=fr"),
            Outcome::Proceed(_) => panic!("expected redirect"),
        }
    }

    #[tokio::test]
    async fn unsupported_directive_neither_redirects_nor_writes() {
        let preferences = Arc::new(MemoryPreferenceStore::new());
        let resolver = resolver(preferences.clone());

        let mut s = signals("/shop", &[("setLanguage", "xx"), ("lang", "fr")]);
        s.visitor_id = Some("v-1".to_string());

        // Falls through to step 2: the query parameter wins.
        assert_eq!(active(&resolver, &s).await, "fr");
        assert_eq!(preferences.stored("v-1"), None);
        assert_eq!(preferences.writes(), 0);
    }

    #[tokio::test]
    async fn background_fetch_suppresses_directive() {
        let preferences = Arc::new(MemoryPreferenceStore::new());
        let resolver = resolver(preferences.clone());

        let mut s = signals("/shop", &[("setLanguage", "es")]);
        s.background_fetch = true;
        s.visitor_id = Some("v-1".to_string());

        assert_eq!(active(&resolver, &s).await, "en");
        assert_eq!(preferences.writes(), 0);
    }

    #[tokio::test]
    async fn bot_change_redirects_without_preference_write() {
        let preferences = Arc::new(MemoryPreferenceStore::new());
        let resolver = resolver(preferences.clone());

        let mut s = signals("/", &[("setLanguage", "fr")]);
        s.user_agent = Some("Googlebot/2.1 (+http://www.google.com/bot.html)".to_string());
        s.visitor_id = Some("v-1".to_string());

        match resolver.resolve(&s).await.unwrap() {
            Outcome::Redirect(location) => assert_eq!(location, "/?lang=fr"),
            Outcome::Proceed(_) => panic!("expected redirect"),
        }
        assert_eq!(preferences.writes(), 0);
    }

    #[tokio::test]
    async fn landing_redirect_applies_remembered_preference() {
        let preferences = Arc::new(MemoryPreferenceStore::new());
        preferences.set("v-1", "fr").await.unwrap();
        let resolver = resolver(preferences);

        let mut s = signals("/", &[]);
        s.visitor_id = Some("v-1".to_string());

        match resolver.resolve(&s).await.unwrap() {
            Outcome::Redirect(location) => assert_eq!(location, "/?lang=fr"),
            Outcome::Proceed(_) => panic!("expected landing redirect"),
        }
    }

    #[tokio::test]
    async fn landing_redirect_is_idempotent() {
        let preferences = Arc::new(MemoryPreferenceStore::new());
        preferences.set("v-1", "en").await.unwrap();
        let resolver = resolver(preferences);

        // Preference equals the resolved language: nothing to do.
        let mut s = signals("/", &[]);
        s.visitor_id = Some("v-1".to_string());
        assert_eq!(active(&resolver, &s).await, "en");
    }

    #[tokio::test]
    async fn landing_redirect_never_overrides_explicit_signal() {
        let preferences = Arc::new(MemoryPreferenceStore::new());
        preferences.set("v-1", "fr").await.unwrap();
        let resolver = resolver(preferences);

        // The remembered choice beats the configured default, never an
        // explicit query signal.
        let mut s = signals("/", &[("lang", "es")]);
        s.visitor_id = Some("v-1".to_string());
        assert_eq!(active(&resolver, &s).await, "es");
    }

    #[tokio::test]
    async fn landing_redirect_skipped_off_root_and_for_bots() {
        let preferences = Arc::new(MemoryPreferenceStore::new());
        preferences.set("v-1", "fr").await.unwrap();
        let resolver = resolver(preferences);

        let mut s = signals("/shop", &[]);
        s.visitor_id = Some("v-1".to_string());
        assert_eq!(active(&resolver, &s).await, "en");

        let mut s = signals("/", &[]);
        s.visitor_id = Some("v-1".to_string());
        s.user_agent = Some("Mozilla/5.0 (compatible; Googlebot/2.1)".to_string());
        assert_eq!(active(&resolver, &s).await, "en");
    }

    #[tokio::test]
    async fn failing_preference_store_degrades_quietly() {
        let preferences = Arc::new(MemoryPreferenceStore::new());
        preferences.set_unavailable(true);
        let resolver = resolver(preferences.clone());

        // Landing check treats a failing store as "no preference".
        let mut s = signals("/", &[]);
        s.visitor_id = Some("v-1".to_string());
        assert_eq!(active(&resolver, &s).await, "en");

        // A directive still redirects even when the write fails.
        let mut s = signals("/", &[("setLanguage", "fr")]);
        s.visitor_id = Some("v-1".to_string());
        match resolver.resolve(&s).await.unwrap() {
            Outcome::Redirect(location) => assert_eq!(location, "/?lang=fr"),
            Outcome::Proceed(_) => panic!("expected redirect"),
        }
    }

    #[test]
    fn bot_signatures_match_case_insensitively() {
        assert!(is_bot("Mozilla/5.0 (compatible; Googlebot/2.1)"));
        assert!(is_bot("msnbot/2.0b"));
        assert!(is_bot("Yahoo! Slurp"));
        assert!(is_bot("SEMrush CRAWLER"));
        assert!(is_bot("Baiduspider+"));
        assert!(!is_bot("Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0"));
    }
}
