use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::warn;

use crate::catalog::{CatalogCache, LanguageCatalog};
use crate::config::I18nConfig;
use crate::error::I18nError;
use crate::resolver::{
    LanguageResolver, Outcome, PreferenceStore, RequestSignals, ResolvedLanguage,
};
use crate::routes::{RouteTable, UrlBuilder};

/// Largest form body the middleware will buffer to read the language field.
const MAX_BUFFERED_BODY: usize = 64 * 1024;

/// Shared i18n state: configuration, catalog cache, route table, resolver.
///
/// Build once at startup with [`I18n::new`] and install
/// [`language_middleware`] via `axum::middleware::from_fn_with_state`.
pub struct I18n {
    pub config: I18nConfig,
    pub catalog: Arc<CatalogCache>,
    pub routes: Arc<RouteTable>,
    resolver: LanguageResolver,
}

impl I18n {
    /// Validates the configured default against the catalog and builds the
    /// route table. The application must refuse to boot on error.
    pub async fn new(
        config: I18nConfig,
        catalog: Arc<dyn LanguageCatalog>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Result<Arc<Self>, I18nError> {
        let catalog = Arc::new(CatalogCache::new(catalog));
        catalog.validate_default(&config.default_language).await?;
        let codes = catalog.iso_codes(true).await?;
        let routes = Arc::new(RouteTable::new(&config, &codes)?);
        let resolver = LanguageResolver::new(config.clone(), catalog.clone(), preferences)
            .with_routes(routes.clone());
        Ok(Arc::new(Self {
            config,
            catalog,
            routes,
            resolver,
        }))
    }

    /// Outbound URL construction for the current request's language.
    pub fn url_builder<'a>(&'a self, language: &'a ResolvedLanguage) -> UrlBuilder<'a> {
        self.routes.url_builder(language)
    }
}

/// Runs language resolution before routing: either answers with a redirect
/// or injects [`ResolvedLanguage`] as a request extension and continues.
pub async fn language_middleware(
    State(i18n): State<Arc<I18n>>,
    req: Request,
    next: Next,
) -> Response {
    let (mut req, signals) = match read_signals(&i18n, req).await {
        Ok(pair) => pair,
        Err(response) => return response,
    };

    match i18n.resolver.resolve(&signals).await {
        Ok(Outcome::Redirect(location)) => Redirect::to(&location).into_response(),
        Ok(Outcome::Proceed(resolved)) => {
            req.extensions_mut().insert(resolved);
            next.run(req).await
        }
        Err(e) => {
            warn!(error = %e, "language resolution failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

impl<S> FromRequestParts<S> for ResolvedLanguage
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<ResolvedLanguage>().cloned().ok_or_else(|| {
            // Programmer error: the layer is missing, don't hide it.
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "language middleware is not installed",
            )
                .into_response()
        })
    }
}

/// Pull everything the resolver needs out of the request. Buffers small
/// urlencoded form bodies to read the body language field, then rebuilds
/// the request so downstream extractors still see the body.
async fn read_signals(i18n: &I18n, req: Request) -> Result<(Request, RequestSignals), Response> {
    let path = req.uri().path().to_string();
    let mut query = parse_query(req.uri().query().unwrap_or(""));

    // A language captured from a `/<lang>` prefix wins over the query
    // string, so it goes first. Rule defaults are not explicit signals and
    // stay out of the precedence chain.
    if let Some(matched) = i18n.routes.match_path(&path) {
        if matched.lang_from_path {
            query.insert(0, (i18n.config.query_param.clone(), matched.lang));
        }
    }

    let header_language = header_value(&req, &i18n.config.header_name);
    let user_agent = header_value(&req, header::USER_AGENT.as_str());
    let background_fetch = header_value(&req, "x-requested-with")
        .map(|v| v.eq_ignore_ascii_case("xmlhttprequest"))
        .unwrap_or(false);
    let visitor_id = header_value(&req, header::COOKIE.as_str())
        .and_then(|cookies| parse_cookie(&cookies, &i18n.config.visitor_cookie));

    let (req, body_language) = read_body_language(&i18n.config, req).await?;

    Ok((
        req,
        RequestSignals {
            path,
            query,
            header_language,
            body_language,
            user_agent,
            background_fetch,
            visitor_id,
        },
    ))
}

fn header_value(req: &Request, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Read the language field out of an urlencoded form body. Only buffers
/// bodies with a declared length under the cap; anything else is skipped,
/// the body signal is best-effort.
async fn read_body_language(
    config: &I18nConfig,
    req: Request,
) -> Result<(Request, Option<String>), Response> {
    let is_form = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);
    let declared_length = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    let method_has_body = [Method::POST, Method::PUT, Method::PATCH].contains(req.method());
    let buffer = is_form
        && method_has_body
        && declared_length.map(|l| l <= MAX_BUFFERED_BODY).unwrap_or(false);
    if !buffer {
        return Ok((req, None));
    }

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_BUFFERED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "failed to buffer form body");
            return Err(StatusCode::BAD_REQUEST.into_response());
        }
    };

    let body_language = std::str::from_utf8(&bytes).ok().and_then(|form| {
        parse_query(form)
            .into_iter()
            .find(|(k, _)| *k == config.body_param)
            .map(|(_, v)| v)
    });

    let req = Request::from_parts(parts, Body::from(bytes));
    Ok((req, body_language))
}

/// Split a raw query/form string into ordered pairs. Values are kept
/// verbatim; language codes are plain ASCII so no decoding is needed for
/// the comparisons the resolver makes.
fn parse_query(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (part.to_string(), String::new()),
        })
        .collect()
}

/// Parse a specific cookie from the Cookie header string.
fn parse_cookie(header: &str, name: &str) -> Option<String> {
    for part in header.split(';') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix(name) {
            if let Some(value) = value.strip_prefix('=') {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_parsing_keeps_order_and_raw_values() {
        let pairs = parse_query("lang=fr&id=7&flag&q=a%20b");
        assert_eq!(
            pairs,
            vec![
                ("lang".to_string(), "fr".to_string()),
                ("id".to_string(), "7".to_string()),
                ("flag".to_string(), String::new()),
                ("q".to_string(), "a%20b".to_string()),
            ]
        );
        assert!(parse_query("").is_empty());
    }

    #[test]
    fn cookie_parsing_finds_named_cookie() {
        let header = "theme=dark; visitor=v-42; other=1";
        assert_eq!(parse_cookie(header, "visitor"), Some("v-42".to_string()));
        assert_eq!(parse_cookie(header, "missing"), None);
    }
}
