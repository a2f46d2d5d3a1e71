//! Postgres-backed implementations of the storage contracts. Schema DDL
//! lives under `migrations/`.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::catalog::{Language, LanguageCatalog};
use crate::error::I18nError;
use crate::resolver::PreferenceStore;
use crate::translations::{TranslationRecord, TranslationSet, TranslationStore};

fn db_err(e: sqlx::Error) -> I18nError {
    I18nError::Database(e.to_string())
}

/// Language catalog over the `language` table.
pub struct PgLanguageCatalog {
    pool: PgPool,
}

impl PgLanguageCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LanguageCatalog for PgLanguageCatalog {
    async fn supported(&self, active_only: bool) -> Result<Vec<Language>, I18nError> {
        let sql = if active_only {
            "SELECT iso_code, title, sort, is_active, created_at, updated_at
             FROM language WHERE is_active ORDER BY sort"
        } else {
            "SELECT iso_code, title, sort, is_active, created_at, updated_at
             FROM language ORDER BY sort"
        };
        sqlx::query_as::<_, Language>(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }
}

/// Per-visitor preference store over the `visitor_preference` table.
/// One read and at most one write per request; last write wins.
pub struct PgPreferenceStore {
    pool: PgPool,
}

impl PgPreferenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PREFERENCE_KEY: &str = "lang";

#[async_trait]
impl PreferenceStore for PgPreferenceStore {
    async fn get(&self, visitor_id: &str) -> Result<Option<String>, I18nError> {
        sqlx::query_scalar::<_, String>(
            "SELECT value FROM visitor_preference WHERE visitor_id = $1 AND key = $2",
        )
        .bind(visitor_id)
        .bind(PREFERENCE_KEY)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| I18nError::PreferenceStore(e.to_string()))
    }

    async fn set(&self, visitor_id: &str, lang: &str) -> Result<(), I18nError> {
        sqlx::query(
            "INSERT INTO visitor_preference (visitor_id, key, value)
             VALUES ($1, $2, $3)
             ON CONFLICT (visitor_id, key)
             DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
        )
        .bind(visitor_id)
        .bind(PREFERENCE_KEY)
        .bind(lang)
        .execute(&self.pool)
        .await
        .map_err(|e| I18nError::PreferenceStore(e.to_string()))?;
        Ok(())
    }
}

/// Translation records over the `translation` table, unique on
/// `(owner_id, key, lang)`.
pub struct PgTranslationStore {
    pool: PgPool,
}

impl PgTranslationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TranslationStore for PgTranslationStore {
    async fn load(&self, owner_id: Uuid) -> Result<TranslationSet, I18nError> {
        let rows = sqlx::query_as::<_, (Uuid, String, String, Option<String>)>(
            "SELECT owner_id, key, lang, value FROM translation WHERE owner_id = $1",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let records = rows
            .into_iter()
            .map(|(owner_id, key, lang, value)| TranslationRecord {
                owner_id,
                key,
                lang,
                value,
            })
            .collect();
        Ok(TranslationSet::new(owner_id, records))
    }

    async fn save(&self, set: &TranslationSet) -> Result<(), I18nError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for record in set.records() {
            sqlx::query(
                "INSERT INTO translation (owner_id, key, lang, value)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (owner_id, key, lang)
                 DO UPDATE SET value = EXCLUDED.value",
            )
            .bind(record.owner_id)
            .bind(&record.key)
            .bind(&record.lang)
            .bind(&record.value)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)
    }

    async fn get(
        &self,
        owner_id: Uuid,
        attribute: &str,
        lang: &str,
    ) -> Result<Option<String>, I18nError> {
        let value = sqlx::query_scalar::<_, Option<String>>(
            "SELECT value FROM translation WHERE owner_id = $1 AND key = $2 AND lang = $3",
        )
        .bind(owner_id)
        .bind(attribute)
        .bind(lang)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(value.flatten())
    }

    async fn find_owners_by_value(
        &self,
        attribute: &str,
        value: &str,
        lang: Option<&str>,
    ) -> Result<Vec<Uuid>, I18nError> {
        let owners = match lang {
            Some(lang) => {
                sqlx::query_scalar::<_, Uuid>(
                    "SELECT DISTINCT owner_id FROM translation
                     WHERE key = $1 AND value = $2 AND lang = $3",
                )
                .bind(attribute)
                .bind(value)
                .bind(lang)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_scalar::<_, Uuid>(
                    "SELECT DISTINCT owner_id FROM translation WHERE key = $1 AND value = $2",
                )
                .bind(attribute)
                .bind(value)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(db_err)?;
        Ok(owners)
    }

    async fn order_owners_by_translation(
        &self,
        attribute: &str,
        lang: &str,
    ) -> Result<Vec<Uuid>, I18nError> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT owner_id FROM translation
             WHERE key = $1 AND lang = $2
             ORDER BY value ASC NULLS LAST",
        )
        .bind(attribute)
        .bind(lang)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }
}
