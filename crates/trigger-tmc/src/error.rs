use thiserror::Error;

#[derive(Debug, Error)]
pub enum TmcError {
    #[error(transparent)]
    Store(#[from] trigger_store::StoreError),
    #[error("rule {0} is not an llm or hybrid rule")]
    NotLlmRule(String),
}

pub type TmcResult<T> = Result<T, TmcError>;
