//! Immutable telemetry frames handed to async consumers

use std::sync::Arc;
use std::time::SystemTime;

use super::{VarData, VariableInfo};
use crate::Result;

/// One captured frame: a consistent copy of a ring buffer.
#[derive(Debug, Clone)]
pub struct TelemetryFrame {
    /// Snapshot bytes (zero-copy via Arc)
    pub data: Arc<[u8]>,

    /// Producer tick of the buffer this frame was copied from
    pub tick: i32,

    /// Wall-clock time the frame was captured
    pub captured_at: SystemTime,
}

impl TelemetryFrame {
    pub fn new(data: impl Into<Arc<[u8]>>, tick: i32, captured_at: SystemTime) -> Self {
        Self { data: data.into(), tick, captured_at }
    }

    /// Decode the value `info` describes from this frame.
    pub fn value<T: VarData>(&self, info: &VariableInfo) -> Result<T> {
        T::from_bytes(&self.data, info)
    }
}
