//! Multi-language support for axum applications: per-request language
//! resolution, language-prefixed routing, per-record attribute translations
//! and a language switcher widget.
//!
//! The resolver runs as a middleware before routing. It picks the active
//! language from, in order: an explicit `setLanguage` directive (which
//! redirects), the `lang` query parameter, the `Set-Language` header, a
//! form-body field, and finally the configured default. A per-visitor
//! preference store remembers explicit choices across sessions.

pub mod catalog;
pub mod config;
pub mod error;
pub mod middleware;
pub mod resolver;
pub mod routes;
pub mod store;
pub mod switcher;
pub mod testing;
pub mod translations;

pub use catalog::{CatalogCache, Language, LanguageCatalog};
pub use config::I18nConfig;
pub use error::I18nError;
pub use middleware::{language_middleware, I18n};
pub use resolver::{
    is_bot, switch_url, LanguageResolver, Outcome, PreferenceStore, RequestSignals,
    ResolvedLanguage,
};
pub use routes::{RouteMatch, RouteTable, UrlBuilder};
pub use switcher::{LanguageSwitcher, SwitcherLink};
pub use translations::{
    TranslatableEntity, Translated, TranslationRecord, TranslationSet, TranslationStore,
};
