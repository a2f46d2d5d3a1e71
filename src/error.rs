use thiserror::Error;

#[derive(Error, Debug)]
pub enum I18nError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Translation relation is not loaded for `{0}`")]
    MissingRelation(String),

    #[error("Setting read-only translated attribute: {0}")]
    ReadOnlyAttribute(String),

    #[error("Preference store error: {0}")]
    PreferenceStore(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
