//! In-memory fakes for the crate's own tests and downstream test suites.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::catalog::{Language, LanguageCatalog};
use crate::error::I18nError;
use crate::resolver::PreferenceStore;
use crate::translations::{TranslationRecord, TranslationSet, TranslationStore};

/// Catalog backed by a fixed language list. Counts storage reads so tests
/// can assert cache behavior.
pub struct MemoryCatalog {
    languages: Vec<Language>,
    pub reads: Arc<AtomicUsize>,
}

impl MemoryCatalog {
    pub fn new(languages: Vec<Language>) -> Self {
        Self {
            languages,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Active languages from iso codes, sorted in the given order.
    pub fn with_codes(codes: &[&str]) -> Self {
        let languages = codes
            .iter()
            .enumerate()
            .map(|(i, code)| Self::language(code, &code.to_uppercase(), i as i16 + 1, true))
            .collect();
        Self::new(languages)
    }

    pub fn language(iso_code: &str, title: &str, sort: i16, is_active: bool) -> Language {
        let now = Utc::now();
        Language {
            iso_code: iso_code.to_string(),
            title: title.to_string(),
            sort,
            is_active,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl LanguageCatalog for MemoryCatalog {
    async fn supported(&self, active_only: bool) -> Result<Vec<Language>, I18nError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut languages: Vec<Language> = self
            .languages
            .iter()
            .filter(|l| !active_only || l.is_active)
            .cloned()
            .collect();
        languages.sort_by_key(|l| l.sort);
        Ok(languages)
    }
}

/// Preference store over a plain map. Can be toggled unavailable to test
/// the best-effort degradation paths.
#[derive(Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Stored preference, bypassing the availability toggle.
    pub fn stored(&self, visitor_id: &str) -> Option<String> {
        self.values.lock().unwrap().get(visitor_id).cloned()
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), I18nError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(I18nError::PreferenceStore(
                "store is unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get(&self, visitor_id: &str) -> Result<Option<String>, I18nError> {
        self.check_available()?;
        Ok(self.values.lock().unwrap().get(visitor_id).cloned())
    }

    async fn set(&self, visitor_id: &str, lang: &str) -> Result<(), I18nError> {
        self.check_available()?;
        self.values
            .lock()
            .unwrap()
            .insert(visitor_id.to_string(), lang.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Translation store over a flat record list, unique on `(owner, key, lang)`.
#[derive(Default)]
pub struct MemoryTranslationStore {
    records: Mutex<Vec<TranslationRecord>>,
}

impl MemoryTranslationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl TranslationStore for MemoryTranslationStore {
    async fn load(&self, owner_id: Uuid) -> Result<TranslationSet, I18nError> {
        let records = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        Ok(TranslationSet::new(owner_id, records))
    }

    async fn save(&self, set: &TranslationSet) -> Result<(), I18nError> {
        let mut records = self.records.lock().unwrap();
        for record in set.records() {
            if let Some(existing) = records.iter_mut().find(|r| {
                r.owner_id == record.owner_id && r.key == record.key && r.lang == record.lang
            }) {
                existing.value = record.value.clone();
            } else {
                records.push(record.clone());
            }
        }
        Ok(())
    }

    async fn get(
        &self,
        owner_id: Uuid,
        attribute: &str,
        lang: &str,
    ) -> Result<Option<String>, I18nError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.owner_id == owner_id && r.key == attribute && r.lang == lang)
            .and_then(|r| r.value.clone()))
    }

    async fn find_owners_by_value(
        &self,
        attribute: &str,
        value: &str,
        lang: Option<&str>,
    ) -> Result<Vec<Uuid>, I18nError> {
        // First-seen order; records of one owner may be interleaved.
        let mut owners: Vec<Uuid> = Vec::new();
        for record in self.records.lock().unwrap().iter().filter(|r| {
            r.key == attribute
                && r.value.as_deref() == Some(value)
                && lang.map(|l| r.lang == l).unwrap_or(true)
        }) {
            if !owners.contains(&record.owner_id) {
                owners.push(record.owner_id);
            }
        }
        Ok(owners)
    }

    async fn order_owners_by_translation(
        &self,
        attribute: &str,
        lang: &str,
    ) -> Result<Vec<Uuid>, I18nError> {
        let mut rows: Vec<(Uuid, Option<String>)> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.key == attribute && r.lang == lang)
            .map(|r| (r.owner_id, r.value.clone()))
            .collect();
        // Missing values sort last, matching the Postgres NULLS LAST order.
        rows.sort_by(|(_, a), (_, b)| match (a, b) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        Ok(rows.into_iter().map(|(owner, _)| owner).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(owner: Uuid, key: &str, lang: &str, value: Option<&str>) -> TranslationRecord {
        TranslationRecord {
            owner_id: owner,
            key: key.to_string(),
            lang: lang.to_string(),
            value: value.map(|v| v.to_string()),
        }
    }

    async fn save_one(store: &MemoryTranslationStore, record: TranslationRecord) {
        let set = TranslationSet::new(record.owner_id, vec![record]);
        store.save(&set).await.unwrap();
    }

    #[tokio::test]
    async fn owner_lookup_deduplicates_interleaved_records() {
        let store = MemoryTranslationStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        // Records of owner `a` end up interleaved with `b`'s.
        save_one(&store, record(a, "name", "en", Some("Chair"))).await;
        save_one(&store, record(b, "name", "en", Some("Chair"))).await;
        save_one(&store, record(a, "name", "fr", Some("Chair"))).await;

        let owners = store.find_owners_by_value("name", "Chair", None).await.unwrap();
        assert_eq!(owners, vec![a, b]);
    }

    #[tokio::test]
    async fn owners_order_by_translated_value_with_missing_last() {
        let store = MemoryTranslationStore::new();
        let pear = Uuid::new_v4();
        let apple = Uuid::new_v4();
        let blank = Uuid::new_v4();

        save_one(&store, record(pear, "name", "en", Some("Pear"))).await;
        save_one(&store, record(apple, "name", "en", Some("Apple"))).await;
        save_one(&store, record(blank, "name", "en", None)).await;
        // Other languages never leak into the ordering.
        save_one(&store, record(blank, "name", "fr", Some("Abricot"))).await;

        let owners = store.order_owners_by_translation("name", "en").await.unwrap();
        assert_eq!(owners, vec![apple, pear, blank]);
    }
}
