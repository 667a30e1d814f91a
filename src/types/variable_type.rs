//! Telemetry variable type definitions

use serde::{Deserialize, Serialize};

use super::BitField;

/// The producer's variable type tags (`irsdk_VarType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableType {
    /// 8-bit character (irsdk_char)
    Char,
    /// 1-byte boolean (irsdk_bool)
    Bool,
    /// 32-bit signed integer (irsdk_int)
    Int32,
    /// 32-bit bitfield (irsdk_bitField)
    BitField,
    /// 32-bit float (irsdk_float)
    Float32,
    /// 64-bit float (irsdk_double)
    Float64,
}

impl VariableType {
    /// Map a raw type tag from a descriptor entry.
    pub const fn from_raw(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(VariableType::Char),
            1 => Some(VariableType::Bool),
            2 => Some(VariableType::Int32),
            3 => Some(VariableType::BitField),
            4 => Some(VariableType::Float32),
            5 => Some(VariableType::Float64),
            _ => None,
        }
    }

    /// Returns the size in bytes of one element.
    /// Matches the irsdk_VarTypeBytes table.
    pub const fn size(&self) -> usize {
        match self {
            VariableType::Char | VariableType::Bool => 1,
            VariableType::Int32 | VariableType::BitField | VariableType::Float32 => 4,
            VariableType::Float64 => 8,
        }
    }
}

/// Runtime value of one element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Char(u8),
    Bool(bool),
    Int32(i32),
    BitField(BitField),
    Float32(f32),
    Float64(f64),
}

impl Value {
    /// Decode one element of `data_type` from the start of `bytes`.
    pub fn decode(data_type: VariableType, bytes: &[u8]) -> Option<Self> {
        let value = match data_type {
            VariableType::Char => Value::Char(*bytes.first()?),
            VariableType::Bool => Value::Bool(*bytes.first()? != 0),
            VariableType::Int32 => Value::Int32(i32::from_le_bytes(word(bytes)?)),
            VariableType::BitField => Value::BitField(BitField(u32::from_le_bytes(word(bytes)?))),
            VariableType::Float32 => Value::Float32(f32::from_le_bytes(word(bytes)?)),
            VariableType::Float64 => {
                Value::Float64(f64::from_le_bytes(bytes.get(..8)?.try_into().ok()?))
            }
        };
        Some(value)
    }
}

fn word(bytes: &[u8]) -> Option<[u8; 4]> {
    bytes.get(..4)?.try_into().ok()
}
