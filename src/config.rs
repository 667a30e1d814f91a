//! Reader and monitor configuration.
//!
//! Both structs deserialize from JSON with every field optional:
//!
//! ```rust
//! use irsdk_shm::{MonitorConfig, UpdateRate};
//! use std::time::Duration;
//!
//! let config = MonitorConfig::from_json_str(r#"{"telemetry_rate": {"Max": 20}}"#).unwrap();
//! assert_eq!(config.telemetry_rate, UpdateRate::Max(20));
//! assert_eq!(config.startup_retry_interval, Duration::from_secs(10));
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::platform::{DATA_VALID_EVENT_NAME, MEMORY_MAP_NAME};
use crate::types::UpdateRate;
use crate::{Result, TelemetryError};

/// Names of the OS objects a [`SessionReader`](crate::SessionReader) opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Logical name of the telemetry memory map
    pub memory_map_name: String,
    /// Logical name of the data-valid signal
    pub data_event_name: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            memory_map_name: MEMORY_MAP_NAME.to_string(),
            data_event_name: DATA_VALID_EVENT_NAME.to_string(),
        }
    }
}

impl ReaderConfig {
    /// Parse a JSON document, filling missing fields with defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject empty object names.
    pub fn validate(&self) -> Result<()> {
        if self.memory_map_name.is_empty() {
            return Err(TelemetryError::config_error("memory_map_name must not be empty", None));
        }
        if self.data_event_name.is_empty() {
            return Err(TelemetryError::config_error("data_event_name must not be empty", None));
        }
        Ok(())
    }
}

/// Polling cadence of a [`TelemetryMonitor`](crate::TelemetryMonitor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Telemetry polling rate
    pub telemetry_rate: UpdateRate,
    /// Interval between session-info checks
    pub session_info_interval: Duration,
    /// Interval between startup attempts while the producer is absent
    pub startup_retry_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            telemetry_rate: UpdateRate::Native,
            session_info_interval: Duration::from_secs(1),
            startup_retry_interval: Duration::from_secs(10),
        }
    }
}

impl MonitorConfig {
    /// Parse a JSON document, filling missing fields with defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject zero intervals, which would spin the polling task.
    pub fn validate(&self) -> Result<()> {
        if self.session_info_interval.is_zero() {
            return Err(TelemetryError::config_error("session_info_interval must be positive", None));
        }
        if self.startup_retry_interval.is_zero() {
            return Err(TelemetryError::config_error("startup_retry_interval must be positive", None));
        }
        Ok(())
    }
}
