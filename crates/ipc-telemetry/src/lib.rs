//! # IPC Telemetry
//!
//! Structured logging for IPC endpoints, built on `tracing`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ipc_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("Failed to init telemetry");
//!     // Agent log lines are now emitted
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `IPC_SERVICE_NAME` | `ipc` | Service name in log lines |
//! | `IPC_LOG_LEVEL` | `RUST_LOG`, then `info` | Log filter directive |
//! | `IPC_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `IPC_JSON_LOGS` | `false` (`true` in containers) | JSON formatted lines |

mod config;
mod logging;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use tracing_setup::init_test_logging;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("Invalid log filter {directive:?}: {reason}")]
    InvalidFilter { directive: String, reason: String },

    #[error("A global subscriber is already installed")]
    AlreadyInitialized,
}

/// Install logging for the process.
///
/// Returns a guard to hold for the lifetime of the application.
///
/// # Errors
///
/// - `TelemetryError::InvalidFilter` - `log_level` is not a valid directive
/// - `TelemetryError::AlreadyInitialized` - called twice in one process
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    tracing_setup::init_tracing(&config)?;
    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service_name: String,
}

impl TelemetryGuard {
    /// Service name logs are tagged with.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry...");
    }
}
