//! Context Window Manager: append-and-trim ordered event log per
//! context key, backed by [`trigger_store::StateStore`].
//!
//! The hard invariants (bounded size, bounded age, eager eviction on
//! write) live in `trigger-store`'s `context_append`/`context_read`
//! implementation — this crate is the typed, config-aware face of
//! that primitive that the rest of the workspace talks to, grounded on
//! the teacher's window-buffer shape (`wf-core::window::buffer`:
//! append + dual-trim, ported here from an in-process `VecDeque` to
//! the store-backed ZSET equivalent).

use std::sync::Arc;

use trigger_store::{StateStore, StoreResult};
use trigger_types::Event;

/// Context Window Manager over a [`StateStore`].
///
/// Cheap to clone (holds only an `Arc<S>` and two `Copy` bounds).
pub struct ContextWindowManager<S: StateStore> {
    store: Arc<S>,
    max_events: u32,
    window_seconds: u64,
}

impl<S: StateStore> Clone for ContextWindowManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            max_events: self.max_events,
            window_seconds: self.window_seconds,
        }
    }
}

impl<S: StateStore> ContextWindowManager<S> {
    pub fn new(store: Arc<S>, max_events: u32, window_seconds: u64) -> Self {
        Self {
            store,
            max_events,
            window_seconds,
        }
    }

    /// Append `event` to its context key's window, trimming by count
    /// and age and refreshing the key's TTL. Concurrent appends under
    /// the same key serialize at the store.
    pub async fn append(&self, event: &Event) -> StoreResult<()> {
        self.store
            .context_append(
                &event.context_key,
                event,
                self.max_events,
                self.window_seconds,
            )
            .await
    }

    /// Read the window for `context_key` in ascending timestamp order.
    pub async fn read(&self, context_key: &str) -> StoreResult<Vec<Event>> {
        self.store.context_read(context_key).await
    }
}
