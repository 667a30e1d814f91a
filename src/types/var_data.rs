//! Typed decoding of variable values

use super::{BitField, VariableInfo, VariableType};
use crate::{Result, TelemetryError};

/// Types that can be parsed out of a telemetry buffer.
pub trait VarData: Sized {
    /// Parse one element of `data_type` at `offset`.
    fn from_element(data: &[u8], offset: usize, data_type: VariableType) -> Result<Self>;

    /// Parse the value `info` describes from a full frame buffer.
    fn from_bytes(data: &[u8], info: &VariableInfo) -> Result<Self> {
        Self::from_element(data, info.offset, info.data_type)
    }
}

fn expect_type(found: VariableType, accepted: &[VariableType], wanted: &str) -> Result<()> {
    if accepted.contains(&found) {
        Ok(())
    } else {
        Err(TelemetryError::TypeConversion { details: format!("Expected {wanted}, got {found:?}") })
    }
}

fn take<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N]> {
    offset
        .checked_add(N)
        .and_then(|end| data.get(offset..end))
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(TelemetryError::Memory { offset, source: None })
}

impl VarData for f32 {
    fn from_element(data: &[u8], offset: usize, data_type: VariableType) -> Result<Self> {
        expect_type(data_type, &[VariableType::Float32], "Float32")?;
        Ok(f32::from_le_bytes(take(data, offset)?))
    }
}

impl VarData for f64 {
    fn from_element(data: &[u8], offset: usize, data_type: VariableType) -> Result<Self> {
        expect_type(data_type, &[VariableType::Float64], "Float64")?;
        Ok(f64::from_le_bytes(take(data, offset)?))
    }
}

impl VarData for i32 {
    fn from_element(data: &[u8], offset: usize, data_type: VariableType) -> Result<Self> {
        expect_type(data_type, &[VariableType::Int32], "Int32")?;
        Ok(i32::from_le_bytes(take(data, offset)?))
    }
}

// Bitfields are commonly consumed as raw masks.
impl VarData for u32 {
    fn from_element(data: &[u8], offset: usize, data_type: VariableType) -> Result<Self> {
        expect_type(data_type, &[VariableType::BitField, VariableType::Int32], "BitField or Int32")?;
        Ok(u32::from_le_bytes(take(data, offset)?))
    }
}

impl VarData for u8 {
    fn from_element(data: &[u8], offset: usize, data_type: VariableType) -> Result<Self> {
        expect_type(data_type, &[VariableType::Char], "Char")?;
        Ok(take::<1>(data, offset)?[0])
    }
}

impl VarData for bool {
    fn from_element(data: &[u8], offset: usize, data_type: VariableType) -> Result<Self> {
        expect_type(data_type, &[VariableType::Bool], "Bool")?;
        Ok(take::<1>(data, offset)?[0] != 0)
    }
}

impl VarData for BitField {
    fn from_element(data: &[u8], offset: usize, data_type: VariableType) -> Result<Self> {
        expect_type(data_type, &[VariableType::BitField], "BitField")?;
        Ok(BitField(u32::from_le_bytes(take(data, offset)?)))
    }
}

// Array support: `from_bytes` walks all `count` elements.
impl<T: VarData> VarData for Vec<T> {
    fn from_element(data: &[u8], offset: usize, data_type: VariableType) -> Result<Self> {
        Ok(vec![T::from_element(data, offset, data_type)?])
    }

    fn from_bytes(data: &[u8], info: &VariableInfo) -> Result<Self> {
        let element_size = info.data_type.size();
        (0..info.count)
            .map(|i| T::from_element(data, info.offset + i * element_size, info.data_type))
            .collect()
    }
}
