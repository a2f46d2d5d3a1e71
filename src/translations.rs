use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::I18nError;
use crate::resolver::ResolvedLanguage;

/// One `(owner, attribute, language)` value row. A missing row is logically
/// equivalent to a `None` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRecord {
    pub owner_id: Uuid,
    pub key: String,
    pub lang: String,
    pub value: Option<String>,
}

/// In-memory translation grid for one owning entity.
///
/// Owned by the entity instance for the duration of one load/save cycle.
/// This collection is the only legitimate mutation path for translations;
/// the attribute accessor surface is read-only.
#[derive(Debug, Clone, Default)]
pub struct TranslationSet {
    owner_id: Uuid,
    records: Vec<TranslationRecord>,
}

impl TranslationSet {
    pub fn new(owner_id: Uuid, records: Vec<TranslationRecord>) -> Self {
        Self { owner_id, records }
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn records(&self) -> &[TranslationRecord] {
        &self.records
    }

    pub fn get(&self, attribute: &str, lang: &str) -> Option<&TranslationRecord> {
        self.records
            .iter()
            .find(|r| r.key == attribute && r.lang == lang)
    }

    /// Value for `(attribute, lang)`, if a non-null record exists.
    pub fn value(&self, attribute: &str, lang: &str) -> Option<&str> {
        self.get(attribute, lang).and_then(|r| r.value.as_deref())
    }

    /// Value for `lang`, falling back to the default language when the
    /// record is missing or blank (empty/whitespace-only) and the default
    /// differs. `None` when both are blank or absent.
    pub fn value_or_default(
        &self,
        attribute: &str,
        lang: &str,
        default_lang: &str,
    ) -> Option<&str> {
        let own = self.value(attribute, lang).filter(|v| !v.trim().is_empty());
        if own.is_some() {
            return own;
        }
        if lang != default_lang {
            return self
                .value(attribute, default_lang)
                .filter(|v| !v.trim().is_empty());
        }
        None
    }

    /// Set one translation value, inserting the record when absent.
    pub fn set_value(&mut self, attribute: &str, lang: &str, value: Option<String>) {
        if let Some(record) = self
            .records
            .iter_mut()
            .find(|r| r.key == attribute && r.lang == lang)
        {
            record.value = value;
            return;
        }
        self.records.push(TranslationRecord {
            owner_id: self.owner_id,
            key: attribute.to_string(),
            lang: lang.to_string(),
            value,
        });
    }

    /// Materialize an explicit empty record for every `(attribute, lang)`
    /// pair not yet present, so editing UIs always see a full grid.
    /// Idempotent. Returns the number of records added.
    pub fn populate_missing(&mut self, attributes: &[String], langs: &[String]) -> usize {
        let mut added = 0;
        for attribute in attributes {
            for lang in langs {
                if self.get(attribute, lang).is_none() {
                    self.records.push(TranslationRecord {
                        owner_id: self.owner_id,
                        key: attribute.clone(),
                        lang: lang.clone(),
                        value: None,
                    });
                    added += 1;
                }
            }
        }
        added
    }
}

/// Implemented by domain entities that carry translated attributes.
///
/// The translation relation is loaded alongside the entity; an entity whose
/// relation was never loaded cannot hand out translated values.
pub trait TranslatableEntity {
    /// Attribute names that have translations.
    fn translated_attributes(&self) -> &[String];

    /// The loaded translation relation, `None` when the load skipped it.
    fn translations(&self) -> Option<&TranslationSet>;

    /// Name of the backing relation, for diagnostics.
    fn relation_name(&self) -> &str {
        "translations"
    }
}

/// Read-only accessor resolving translated attributes against the request
/// language. Construction fails with [`I18nError::MissingRelation`] when the
/// backing relation was not loaded.
pub struct Translated<'a, E: TranslatableEntity> {
    entity: &'a E,
    language: &'a ResolvedLanguage,
}

impl<'a, E: TranslatableEntity> Translated<'a, E> {
    pub fn new(entity: &'a E, language: &'a ResolvedLanguage) -> Result<Self, I18nError> {
        if entity.translations().is_none() {
            return Err(I18nError::MissingRelation(
                entity.relation_name().to_string(),
            ));
        }
        Ok(Self { entity, language })
    }

    /// Value of a translated attribute in the active language, falling back
    /// to the default language when blank or missing.
    pub fn translated(&self, attribute: &str) -> Option<&str> {
        self.translated_in(attribute, &self.language.active)
    }

    /// Same lookup pinned to a specific language.
    pub fn translated_in(&self, attribute: &str, lang: &str) -> Option<&str> {
        let set = self.entity.translations()?;
        set.value_or_default(attribute, lang, &self.language.default)
    }

    /// Translated attributes are read-only through the accessor surface;
    /// mutate the [`TranslationSet`] instead. Always an error.
    pub fn assign(&self, attribute: &str, _value: &str) -> Result<(), I18nError> {
        if self
            .entity
            .translated_attributes()
            .iter()
            .any(|a| a == attribute)
        {
            return Err(I18nError::ReadOnlyAttribute(attribute.to_string()));
        }
        Err(I18nError::Config(format!(
            "`{attribute}` is not a translated attribute"
        )))
    }
}

/// Persistence contract for translation records. The core only defines the
/// interface; storage lives outside (see [`crate::store`] for Postgres).
#[async_trait]
pub trait TranslationStore: Send + Sync {
    /// Load the full translation set of one owner.
    async fn load(&self, owner_id: Uuid) -> Result<TranslationSet, I18nError>;

    /// Upsert every record of the set on the `(owner, key, lang)` unique key.
    async fn save(&self, set: &TranslationSet) -> Result<(), I18nError>;

    /// Single-value lookup without loading the whole set.
    async fn get(
        &self,
        owner_id: Uuid,
        attribute: &str,
        lang: &str,
    ) -> Result<Option<String>, I18nError>;

    /// Owners whose translated `attribute` equals `value`, optionally
    /// constrained to one language.
    async fn find_owners_by_value(
        &self,
        attribute: &str,
        value: &str,
        lang: Option<&str>,
    ) -> Result<Vec<Uuid>, I18nError>;

    /// Owner ids ordered ascending by their `attribute` value in `lang`.
    /// Owners without a value for that language sort last.
    async fn order_owners_by_translation(
        &self,
        attribute: &str,
        lang: &str,
    ) -> Result<Vec<Uuid>, I18nError>;
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

    fn sample_set() -> TranslationSet {
        let owner = Uuid::new_v4();
        TranslationSet::new(
            owner,
            vec![
                record(owner, "name", "en", Some("Chair")),
                record(owner, "name", "fr", Some("  ")),
                record(owner, "description", "en", None),
            ],
        )
    }

    struct Product {
        attributes: Vec<String>,
        translations: Option<TranslationSet>,
    }

    impl TranslatableEntity for Product {
        fn translated_attributes(&self) -> &[String] {
            &self.attributes
        }

        fn translations(&self) -> Option<&TranslationSet> {
            self.translations.as_ref()
        }
    }

    fn language(active: &str) -> ResolvedLanguage {
        ResolvedLanguage {
            active: active.to_string(),
            default: "en".to_string(),
            explicit_change: false,
        }
    }

    #[test]
    fn blank_value_falls_back_to_default_language() {
        let set = sample_set();
        assert_eq!(set.value_or_default("name", "fr", "en"), Some("Chair"));
        assert_eq!(set.value_or_default("name", "en", "en"), Some("Chair"));
        // Both blank or absent: None.
        assert_eq!(set.value_or_default("description", "fr", "en"), None);
        assert_eq!(set.value_or_default("missing", "fr", "en"), None);
    }

    #[test]
    fn populate_missing_is_idempotent() {
        let mut set = sample_set();
        let attributes = vec!["name".to_string(), "description".to_string()];
        let langs = vec!["en".to_string(), "fr".to_string(), "es".to_string()];

        let added = set.populate_missing(&attributes, &langs);
        assert_eq!(added, 3); // name/es, description/fr, description/es
        assert_eq!(set.records().len(), 6);

        let added_again = set.populate_missing(&attributes, &langs);
        assert_eq!(added_again, 0);
        assert_eq!(set.records().len(), 6);
    }

    #[test]
    fn set_value_updates_in_place() {
        let mut set = sample_set();
        set.set_value("name", "fr", Some("Chaise".to_string()));
        assert_eq!(set.value("name", "fr"), Some("Chaise"));
        assert_eq!(
            set.records()
                .iter()
                .filter(|r| r.key == "name" && r.lang == "fr")
                .count(),
            1
        );
    }

    #[test]
    fn accessor_resolves_against_request_language() {
        let product = Product {
            attributes: vec!["name".to_string()],
            translations: Some(sample_set()),
        };
        let fr = language("fr");
        let translated = Translated::new(&product, &fr).unwrap();
        // French is blank, falls back to English.
        assert_eq!(translated.translated("name"), Some("Chair"));
    }

    #[test]
    fn accessor_is_read_only() {
        let product = Product {
            attributes: vec!["name".to_string()],
            translations: Some(sample_set()),
        };
        let en = language("en");
        let translated = Translated::new(&product, &en).unwrap();
        assert!(matches!(
            translated.assign("name", "Table"),
            Err(I18nError::ReadOnlyAttribute(_))
        ));
    }

    #[test]
    fn missing_relation_is_fatal_at_construction() {
        let product = Product {
            attributes: vec!["name".to_string()],
            translations: None,
        };
        let en = language("en");
        assert!(matches!(
            Translated::new(&product, &en),
            Err(I18nError::MissingRelation(_))
        ));
    }
}
