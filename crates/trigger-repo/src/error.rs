use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Store(#[from] trigger_store::StoreError),
    #[error("rule {0} has no event_types")]
    EmptyEventTypes(String),
}

pub type RepoResult<T> = Result<T, RepoError>;
