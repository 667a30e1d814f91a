//! Error types for shared-memory telemetry access.
//!
//! The platform handles and typed value accessors report failures through
//! [`TelemetryError`]. The session reader's polling protocol stays boolean
//! driven: expected conditions such as "simulator not running" or "no new
//! frame" are logged and surfaced as `false`, never as errors.
//!
//! ## Error Categories
//!
//! - **Connection Errors**: the named memory map or data signal is unavailable
//! - **Memory Errors**: an offset or length falls outside the mapped region
//! - **Parse Errors**: the producer's header or descriptor table is malformed
//! - **Type Conversion Errors**: a value was requested as the wrong type
//! - **OS Errors**: platform API failures (POSIX or Windows)
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use irsdk_shm::TelemetryError;
//!
//! let error = TelemetryError::connection_failed("simulator not running");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use thiserror::Error;

#[cfg(windows)]
use windows_core as core;

/// Result type alias for telemetry operations.
pub type Result<T, E = TelemetryError> = std::result::Result<T, E>;

/// Main error type for telemetry operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TelemetryError {
    #[error("Failed to connect to simulator: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Memory access violation at offset {offset:#x}")]
    Memory {
        offset: usize,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Field '{field}' not found in telemetry data")]
    FieldNotFound { field: String },

    #[error("Type conversion error: {details}")]
    TypeConversion { details: String },

    #[error("{feature} is only available on {required_platform}")]
    UnsupportedPlatform { feature: String, required_platform: String },

    #[error("Invalid configuration: {details}")]
    Config {
        details: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("OS error during {operation}")]
    #[cfg(unix)]
    Os {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Windows API error: {operation}")]
    #[cfg(windows)]
    WindowsApi {
        operation: String,
        #[source]
        source: core::Error,
    },
}

impl TelemetryError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TelemetryError::Connection { .. } => true,
            TelemetryError::Memory { .. } => false,
            TelemetryError::Parse { .. } => false,
            TelemetryError::FieldNotFound { .. } => false,
            TelemetryError::TypeConversion { .. } => false,
            TelemetryError::UnsupportedPlatform { .. } => false,
            TelemetryError::Config { .. } => false,
            #[cfg(unix)]
            TelemetryError::Os { source, .. } => {
                matches!(source.kind(), std::io::ErrorKind::NotFound | std::io::ErrorKind::Interrupted)
            }
            #[cfg(windows)]
            TelemetryError::WindowsApi { .. } => true,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TelemetryError::Connection { .. } => vec![
                "Ensure the simulator is running",
                "Check permissions for shared memory access",
                "Retry on the next poll",
            ],
            TelemetryError::Memory { .. } => vec![
                "Check memory access bounds",
                "Verify shared memory is still mapped",
                "Reconnect to rebuild the layout",
            ],
            TelemetryError::Parse { .. } => vec![
                "Check producer header version compatibility",
                "Verify source data integrity",
            ],
            TelemetryError::FieldNotFound { .. } => vec![
                "Check field name spelling",
                "Verify the field exists in the current variable table",
            ],
            TelemetryError::TypeConversion { .. } => vec![
                "Check data type compatibility",
                "Verify expected vs actual data types",
            ],
            TelemetryError::UnsupportedPlatform { .. } => vec![
                "Use platform-appropriate features",
                "Check documentation for platform requirements",
            ],
            TelemetryError::Config { .. } => vec![
                "Check configuration field names and types",
                "Fall back to the default configuration",
            ],
            #[cfg(unix)]
            TelemetryError::Os { .. } => vec![
                "Check that the producer created the shared objects",
                "Check /dev/shm permissions",
            ],
            #[cfg(windows)]
            TelemetryError::WindowsApi { .. } => vec![
                "Check Windows API permissions",
                "Verify system resources availability",
            ],
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        TelemetryError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        TelemetryError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for memory access errors.
    pub fn memory_access_error(offset: usize) -> Self {
        TelemetryError::Memory { offset, source: None }
    }

    /// Helper constructor for parse errors.
    pub fn parse_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        TelemetryError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(
        details: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        TelemetryError::Config { details: details.into(), source }
    }

    /// Helper constructor for POSIX API errors, capturing `errno`.
    #[cfg(unix)]
    pub fn os_error(operation: impl Into<String>) -> Self {
        TelemetryError::Os { operation: operation.into(), source: std::io::Error::last_os_error() }
    }

    /// Helper constructor for Windows API errors.
    #[cfg(windows)]
    pub fn windows_api_error(operation: impl Into<String>, source: core::Error) -> Self {
        TelemetryError::WindowsApi { operation: operation.into(), source }
    }

    /// Helper constructor for unsupported platform errors.
    pub fn unsupported_platform(
        feature: impl Into<String>,
        required_platform: impl Into<String>,
    ) -> Self {
        TelemetryError::UnsupportedPlatform {
            feature: feature.into(),
            required_platform: required_platform.into(),
        }
    }
}

impl From<serde_json::Error> for TelemetryError {
    fn from(err: serde_json::Error) -> Self {
        TelemetryError::Config { details: err.to_string(), source: Some(Box::new(err)) }
    }
}

#[cfg(windows)]
impl From<core::Error> for TelemetryError {
    fn from(err: core::Error) -> Self {
        TelemetryError::WindowsApi {
            operation: "Unknown Windows operation".to_string(),
            source: err,
        }
    }
}
