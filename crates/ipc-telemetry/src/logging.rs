//! Logging helpers shared by IPC endpoints.
//!
//! Lines carry a consistent set of fields so that both sides of a
//! connection can be correlated:
//! - `role`: `client` or `server`
//! - `channel`: physical channel name
//! - Additional context fields

/// Create a span carrying the endpoint role.
///
/// # Example
///
/// ```rust,ignore
/// use ipc_telemetry::endpoint_span;
///
/// let _span = endpoint_span!("handle_ping", role = "server", peer = 3).entered();
/// ```
#[macro_export]
macro_rules! endpoint_span {
    ($name:expr, role = $role:expr $(, $($field:tt)*)?) => {
        tracing::info_span!($name, role = $role $(, $($field)*)?)
    };
}

/// Log a channel-related event with standard fields.
#[macro_export]
macro_rules! log_channel_event {
    ($level:ident, $role:expr, $channel:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            role = $role,
            channel = %$channel,
            $($($field)*,)?
            $msg
        )
    };
}
