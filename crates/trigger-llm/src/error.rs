use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error(transparent)]
    Store(#[from] trigger_store::StoreError),
    #[error("cache serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type LlmResult<T> = Result<T, LlmError>;
