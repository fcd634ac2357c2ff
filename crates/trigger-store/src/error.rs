use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("lock not held: {0}")]
    LockNotHeld(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
