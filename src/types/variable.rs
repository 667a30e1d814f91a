//! Variable descriptors and caller-owned value buffers

use serde::{Deserialize, Serialize};

use super::{Value, VarData, VariableType};
use crate::Result;

/// Information about a specific telemetry variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableInfo {
    /// Variable name as published by the producer
    pub name: String,
    /// Data type of the variable
    pub data_type: VariableType,
    /// Byte offset within a telemetry buffer
    pub offset: usize,
    /// Number of elements (1 for scalar, >1 for arrays)
    pub count: usize,
    /// Whether the producer treats the element count as elapsed time
    pub count_as_time: bool,
    /// Units of measurement (e.g., "m/s", "C", "N*m")
    pub units: String,
    /// Human-readable description
    pub description: String,
}

impl VariableInfo {
    /// Total size of the value in bytes.
    pub fn byte_len(&self) -> usize {
        self.data_type.size() * self.count
    }
}

/// A variable handle owning its descriptor and a value buffer.
///
/// Filled by [`SessionReader::read_variable`](crate::SessionReader::read_variable).
#[derive(Debug, Clone)]
pub struct TelemetryVariable {
    info: VariableInfo,
    buffer: Vec<u8>,
}

impl TelemetryVariable {
    /// Create a handle with a zeroed buffer sized for `info`.
    pub fn new(info: VariableInfo) -> Self {
        let buffer = vec![0u8; info.byte_len()];
        Self { info, buffer }
    }

    pub fn info(&self) -> &VariableInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Raw value bytes from the last successful read.
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Decode every element of the buffer.
    pub fn values(&self) -> Vec<Value> {
        self.buffer
            .chunks_exact(self.info.data_type.size())
            .filter_map(|chunk| Value::decode(self.info.data_type, chunk))
            .collect()
    }

    /// Decode the first element as `T`.
    pub fn get<T: VarData>(&self) -> Result<T> {
        T::from_element(&self.buffer, 0, self.info.data_type)
    }

    /// Decode element `index` as `T`.
    pub fn get_at<T: VarData>(&self, index: usize) -> Result<T> {
        if index >= self.info.count {
            return Err(crate::TelemetryError::FieldNotFound {
                field: format!("{}[{}]", self.info.name, index),
            });
        }
        T::from_element(&self.buffer, index * self.info.data_type.size(), self.info.data_type)
    }
}
