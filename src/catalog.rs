use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::I18nError;

/// One supported language row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Language {
    pub iso_code: String,
    pub title: String,
    pub sort: i16,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read-only access to the set of supported languages.
///
/// Implementations return languages ascending by `sort`; when `active_only`
/// is set, inactive rows are excluded.
#[async_trait]
pub trait LanguageCatalog: Send + Sync {
    async fn supported(&self, active_only: bool) -> Result<Vec<Language>, I18nError>;
}

/// Memoizing wrapper around a [`LanguageCatalog`].
///
/// The cache lives as long as the wrapper: one per process for route-table
/// construction and request resolution. Languages don't change mid-request,
/// so repeated reads within a request hit the memo. Call [`invalidate`]
/// if the supported set can change at runtime.
///
/// [`invalidate`]: CatalogCache::invalidate
pub struct CatalogCache {
    inner: Arc<dyn LanguageCatalog>,
    all: RwLock<Option<Arc<Vec<Language>>>>,
    active: RwLock<Option<Arc<Vec<Language>>>>,
}

impl CatalogCache {
    pub fn new(inner: Arc<dyn LanguageCatalog>) -> Self {
        Self {
            inner,
            all: RwLock::new(None),
            active: RwLock::new(None),
        }
    }

    /// Supported languages, sorted ascending by `sort`.
    pub async fn supported(&self, active_only: bool) -> Result<Arc<Vec<Language>>, I18nError> {
        let slot = if active_only { &self.active } else { &self.all };
        if let Some(cached) = slot.read().await.as_ref() {
            return Ok(cached.clone());
        }
        let languages = Arc::new(self.inner.supported(active_only).await?);
        *slot.write().await = Some(languages.clone());
        Ok(languages)
    }

    /// Projection of [`supported`](CatalogCache::supported) to iso codes.
    pub async fn iso_codes(&self, active_only: bool) -> Result<Vec<String>, I18nError> {
        let languages = self.supported(active_only).await?;
        Ok(languages.iter().map(|l| l.iso_code.clone()).collect())
    }

    /// Whether `code` names an active supported language.
    pub async fn is_supported(&self, code: &str) -> Result<bool, I18nError> {
        let languages = self.supported(true).await?;
        Ok(languages.iter().any(|l| l.iso_code == code))
    }

    /// Drop both memoized lists. The next read goes back to storage.
    pub async fn invalidate(&self) {
        *self.all.write().await = None;
        *self.active.write().await = None;
    }

    /// Startup check: the catalog must not be empty and the configured
    /// default must be among the active languages. The application must
    /// refuse to boot otherwise.
    pub async fn validate_default(&self, default_language: &str) -> Result<(), I18nError> {
        let languages = self.supported(true).await?;
        if languages.is_empty() {
            return Err(I18nError::Config(
                "no supported languages found. Did you insert languages into the language table?"
                    .to_string(),
            ));
        }
        if !languages.iter().any(|l| l.iso_code == default_language) {
            return Err(I18nError::Config(format!(
                "default language `{default_language}` is not among the supported languages"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryCatalog;

    #[tokio::test]
    async fn supported_is_sorted_and_filters_inactive() {
        let catalog = MemoryCatalog::new(vec![
            MemoryCatalog::language("fr", "Français", 2, true),
            MemoryCatalog::language("en", "English", 1, true),
            MemoryCatalog::language("de", "Deutsch", 3, false),
        ]);
        let cache = CatalogCache::new(Arc::new(catalog));

        let active = cache.iso_codes(true).await.unwrap();
        assert_eq!(active, vec!["en", "fr"]);

        let all = cache.iso_codes(false).await.unwrap();
        assert_eq!(all, vec!["en", "fr", "de"]);
    }

    #[tokio::test]
    async fn cache_serves_repeat_reads_until_invalidated() {
        let catalog = MemoryCatalog::with_codes(&["en"]);
        let reads = catalog.reads.clone();
        let cache = CatalogCache::new(Arc::new(catalog));

        cache.supported(true).await.unwrap();
        cache.supported(true).await.unwrap();
        assert_eq!(reads.load(std::sync::atomic::Ordering::SeqCst), 1);

        cache.invalidate().await;
        cache.supported(true).await.unwrap();
        assert_eq!(reads.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn validation_rejects_empty_catalog_and_unknown_default() {
        let empty = CatalogCache::new(Arc::new(MemoryCatalog::new(vec![])));
        assert!(matches!(
            empty.validate_default("en").await,
            Err(I18nError::Config(_))
        ));

        let cache = CatalogCache::new(Arc::new(MemoryCatalog::with_codes(&["en", "fr"])));
        assert!(cache.validate_default("en").await.is_ok());
        assert!(matches!(
            cache.validate_default("de").await,
            Err(I18nError::Config(_))
        ));
    }
}
