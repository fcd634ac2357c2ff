use thiserror::Error;

/// Systemic failures only — a single rule's expression/LLM failure is
/// handled inline (logged, treated as non-fire) and never surfaces
/// here. An `Err` from [`crate::handler::EventHandler::handle`] means
/// the broker adapter should nack the message for redelivery
/// (spec.md §4.6 step 6, §7).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] trigger_store::StoreError),
    #[error(transparent)]
    Repo(#[from] trigger_repo::RepoError),
    #[error(transparent)]
    Tmc(#[from] trigger_tmc::TmcError),
    #[error(transparent)]
    Llm(#[from] trigger_llm::LlmError),
    #[error(transparent)]
    Notify(#[from] trigger_notify::NotifyError),
}

pub type CoreResult<T> = Result<T, CoreError>;
