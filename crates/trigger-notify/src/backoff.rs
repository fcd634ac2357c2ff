use std::time::Duration;

use rand::Rng;

/// `min(2^retry_count * base, max)` with full jitter — same shape as
/// the teacher's exponential-backoff retry policy, specialized to a
/// single fixed strategy since the notification worker has only one
/// kind of transient failure to back off from.
pub fn calculate_delay(retry_count: u32, base: Duration, max: Duration) -> Duration {
    let pow = retry_count.min(16);
    let exp = base.saturating_mul(2_u32.saturating_pow(pow));
    let capped = exp.min(max);
    apply_jitter(capped)
}

/// Full jitter: a uniformly random duration in `[0, delay]`.
fn apply_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().r#gen();
    Duration::from_millis((delay.as_millis() as f64 * factor).round() as u64)
}
