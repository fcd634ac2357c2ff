use std::sync::atomic::{AtomicU64, Ordering};

/// Delivery-outcome counters for the notification worker — sent,
/// retried, and dead-lettered. Enqueue/skip counts live one layer up
/// in `trigger_core::TriggerMetrics` (the enqueue gate's caller
/// already threads a metrics handle through); this crate only sees
/// tasks after they're queued, so it owns the delivery-side counters.
#[derive(Default)]
pub struct NotifyMetrics {
    sent_total: AtomicU64,
    retried_total: AtomicU64,
    dead_lettered_total: AtomicU64,
}

impl NotifyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_sent(&self) {
        self.sent_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retried(&self) {
        self.retried_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dead_lettered(&self) {
        self.dead_lettered_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent(&self) -> u64 {
        self.sent_total.load(Ordering::Relaxed)
    }

    pub fn retried(&self) -> u64 {
        self.retried_total.load(Ordering::Relaxed)
    }

    pub fn dead_lettered(&self) -> u64 {
        self.dead_lettered_total.load(Ordering::Relaxed)
    }
}
