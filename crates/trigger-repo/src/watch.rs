use std::sync::Arc;

use trigger_store::StateStore;

use crate::repo::RuleRepository;

/// Anything that can notify the repository "something changed,
/// refetch soon" without the repository having to know how the
/// notification arrived. Implemented for real pub/sub transports;
/// tests drive `RuleRepository::invalidate` directly instead.
#[async_trait::async_trait]
pub trait InvalidationHint: Send + Sync {
    /// Block until a hint arrives, or return `None` on shutdown.
    async fn recv(&mut self) -> Option<()>;
}

/// Drive `repo.invalidate()` every time `hint` fires, until `hint`
/// closes. Purely a latency optimization — the version compare in
/// `RuleRepository::match_event` is what actually guarantees
/// freshness, so a missed or delayed hint never produces stale reads,
/// only a slower-to-notice refresh.
pub async fn watch_invalidations<S: StateStore>(
    repo: Arc<RuleRepository<S>>,
    mut hint: impl InvalidationHint,
) {
    while hint.recv().await.is_some() {
        repo.invalidate().await;
    }
}
