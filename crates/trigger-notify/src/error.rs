use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error(transparent)]
    Store(#[from] trigger_store::StoreError),
}

pub type NotifyResult<T> = Result<T, NotifyError>;
