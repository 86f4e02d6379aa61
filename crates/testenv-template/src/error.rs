use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unknown template reference '{0}'")]
    UnknownReference(String),

    #[error("failed to deep-copy spec fragment: {0}")]
    Serialization(#[from] serde_json::Error),
}
