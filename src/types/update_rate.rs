//! Telemetry polling rate

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often the monitor polls for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpdateRate {
    /// Poll every millisecond and publish every producer frame
    #[default]
    Native,

    /// Poll at most this many times per second
    Max(u32),
}

impl UpdateRate {
    const NATIVE_INTERVAL: Duration = Duration::from_millis(1);

    /// Interval between telemetry polls.
    pub fn poll_interval(self) -> Duration {
        match self {
            UpdateRate::Native | UpdateRate::Max(0) => Self::NATIVE_INTERVAL,
            UpdateRate::Max(hz) => Duration::from_secs_f64(1.0 / hz as f64).max(Self::NATIVE_INTERVAL),
        }
    }
}
