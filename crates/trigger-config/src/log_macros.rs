/// Domain-aware logging macros.
///
/// Each macro injects a `domain` field automatically so callers never
/// need to remember the string literal. Domain is one of: `sys`,
/// `ingest`, `rule`, `llm`, `notify`, `store`.
///
/// ```ignore
/// use trigger_config::{trg_info, trg_warn};
///
/// trg_info!(ingest, event_id = %id, "event ingested");
/// trg_warn!(llm, error = %e, "llm call failed");
/// ```
#[doc(hidden)]
#[macro_export]
macro_rules! trg_log {
    ($level:ident, $domain:ident, $($field:tt)*) => {
        tracing::$level!(domain = stringify!($domain), $($field)*)
    };
}

/// Log at ERROR level with an automatic `domain` field.
#[macro_export]
macro_rules! trg_error {
    ($domain:ident, $($rest:tt)*) => {
        $crate::trg_log!(error, $domain, $($rest)*)
    };
}

/// Log at WARN level with an automatic `domain` field.
#[macro_export]
macro_rules! trg_warn {
    ($domain:ident, $($rest:tt)*) => {
        $crate::trg_log!(warn, $domain, $($rest)*)
    };
}

/// Log at INFO level with an automatic `domain` field.
#[macro_export]
macro_rules! trg_info {
    ($domain:ident, $($rest:tt)*) => {
        $crate::trg_log!(info, $domain, $($rest)*)
    };
}

/// Log at DEBUG level with an automatic `domain` field.
#[macro_export]
macro_rules! trg_debug {
    ($domain:ident, $($rest:tt)*) => {
        $crate::trg_log!(debug, $domain, $($rest)*)
    };
}
