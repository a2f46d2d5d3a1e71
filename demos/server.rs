//! Demo server: three languages, a translated product page and the
//! language switcher widget. Run with `cargo run --example server`.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Request, State},
    middleware::from_fn_with_state,
    response::Html,
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use axum_language::testing::{MemoryCatalog, MemoryPreferenceStore};
use axum_language::{
    language_middleware, I18n, I18nConfig, LanguageSwitcher, ResolvedLanguage, TranslationRecord,
    TranslationSet,
};

struct AppState {
    i18n: Arc<I18n>,
    product: TranslationSet,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("axum_language=info".parse()?))
        .init();

    let catalog = Arc::new(MemoryCatalog::new(vec![
        MemoryCatalog::language("en", "English", 1, true),
        MemoryCatalog::language("fr", "Français", 2, true),
        MemoryCatalog::language("es", "Español", 3, true),
    ]));
    let preferences = Arc::new(MemoryPreferenceStore::new());
    let i18n = I18n::new(I18nConfig::new("en"), catalog, preferences).await?;

    let owner = Uuid::new_v4();
    let mut product = TranslationSet::new(
        owner,
        vec![
            record(owner, "name", "en", "Garden chair"),
            record(owner, "name", "fr", "Chaise de jardin"),
            record(owner, "name", "es", ""),
        ],
    );
    product.populate_missing(
        &["name".to_string()],
        &i18n.catalog.iso_codes(true).await?,
    );

    let state = Arc::new(AppState {
        i18n: i18n.clone(),
        product,
    });

    let app = Router::new()
        .route("/", get(home))
        .route("/shop/view", get(home))
        .fallback(home)
        .with_state(state)
        .layer(from_fn_with_state(i18n, language_middleware))
        .layer(TraceLayer::new_for_http());

    let addr = "0.0.0.0:3000";
    info!("demo server starting on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn record(owner: Uuid, key: &str, lang: &str, value: &str) -> TranslationRecord {
    TranslationRecord {
        owner_id: owner,
        key: key.to_string(),
        lang: lang.to_string(),
        value: Some(value.to_string()),
    }
}

async fn home(
    State(state): State<Arc<AppState>>,
    language: ResolvedLanguage,
    request: Request,
) -> Html<String> {
    let query: Vec<(String, String)> = request
        .uri()
        .query()
        .unwrap_or("")
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (p.to_string(), String::new()),
        })
        .collect();

    let switcher = LanguageSwitcher::new(&state.i18n.catalog, &state.i18n.config)
        .with_routes(&state.i18n.routes)
        .render(&language, request.uri().path(), &query)
        .await
        .unwrap_or_default();

    let name = state
        .product
        .value_or_default("name", &language.active, &language.default)
        .unwrap_or("(untranslated)");

    let shop_url = state
        .i18n
        .url_builder(&language)
        .url("shop/view", &[])
        .unwrap_or_else(|| "/".to_string());

    Html(format!(
        "<html><body>{switcher}<h1>{name}</h1>\
         <p>Active language: {}</p>\
         <p><a href=\"{shop_url}\">Shop</a></p></body></html>",
        language.active,
    ))
}
