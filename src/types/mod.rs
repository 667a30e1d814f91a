//! Core types for telemetry data representation.
//!
//! The type system maps directly to the producer's SDK structures:
//! - [`VariableType`] mirrors `irsdk_VarType` with size information
//! - [`VariableInfo`] is an owned copy of one variable descriptor entry
//! - [`TelemetryVariable`] pairs a descriptor with a caller-owned value buffer
//! - [`VarData`] provides type-safe parsing from binary telemetry data
//! - [`TelemetryFrame`] is an immutable, shareable copy of one snapshot
//!
//! ## Usage Example
//!
//! ```rust
//! use irsdk_shm::types::{VarData, VariableInfo, VariableType};
//!
//! let rpm = VariableInfo {
//!     name: "RPM".to_string(),
//!     data_type: VariableType::Float32,
//!     offset: 0,
//!     count: 1,
//!     count_as_time: false,
//!     units: "revs/min".to_string(),
//!     description: "Engine rpm".to_string(),
//! };
//!
//! let data = 4500.0f32.to_le_bytes();
//! let value: f32 = f32::from_bytes(&data, &rpm).unwrap();
//! assert_eq!(value, 4500.0);
//! ```

mod bitfield;
mod frame;
mod update_rate;
mod var_data;
mod variable;
mod variable_type;

pub use bitfield::BitField;
pub use frame::TelemetryFrame;
pub use update_rate::UpdateRate;
pub use var_data::VarData;
pub use variable::{TelemetryVariable, VariableInfo};
pub use variable_type::{Value, VariableType};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TelemetryError;
    use proptest::prelude::*;
    use std::time::{Duration, SystemTime};

    const ALL_TYPES: [VariableType; 6] = [
        VariableType::Char,
        VariableType::Bool,
        VariableType::Int32,
        VariableType::BitField,
        VariableType::Float32,
        VariableType::Float64,
    ];

    fn info(data_type: VariableType, offset: usize, count: usize) -> VariableInfo {
        VariableInfo {
            name: "test".to_string(),
            data_type,
            offset,
            count,
            count_as_time: false,
            units: "test".to_string(),
            description: "test".to_string(),
        }
    }

    proptest! {
        #[test]
        fn f32_values_decode_at_any_offset(value in any::<f32>(), offset in 0..100usize) {
            let mut data = vec![0u8; offset + 4 + 10];
            data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());

            let parsed = f32::from_bytes(&data, &info(VariableType::Float32, offset, 1)).unwrap();
            prop_assert_eq!(parsed.to_bits(), value.to_bits());
        }

        #[test]
        fn i32_values_decode_at_any_offset(value in any::<i32>(), offset in 0..100usize) {
            let mut data = vec![0u8; offset + 4 + 10];
            data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());

            prop_assert_eq!(i32::from_bytes(&data, &info(VariableType::Int32, offset, 1)).unwrap(), value);
        }

        #[test]
        fn bitfields_handle_all_32bit_patterns(value in any::<u32>(), offset in 0..100usize) {
            let mut data = vec![0u8; offset + 4 + 10];
            data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());

            let parsed = BitField::from_bytes(&data, &info(VariableType::BitField, offset, 1)).unwrap();
            prop_assert_eq!(parsed.value(), value);
        }

        #[test]
        fn bitfield_flag_operations(value in any::<u32>(), bit_index in 0..32u32) {
            let bitfield = BitField::new(value);
            let expected_bit_set = (value & (1 << bit_index)) != 0;
            prop_assert_eq!(bitfield.is_set(bit_index), expected_bit_set);
            prop_assert_eq!(bitfield.has_flag(1 << bit_index), expected_bit_set);
        }

        #[test]
        fn out_of_range_reads_are_memory_errors(len in 0..16usize, offset in 0..32usize) {
            let data = vec![0u8; len];
            let result = f64::from_bytes(&data, &info(VariableType::Float64, offset, 1));
            prop_assert_eq!(result.is_ok(), offset + 8 <= len);
            if let Err(err) = result {
                prop_assert!(
                    matches!(err, TelemetryError::Memory { offset: o, .. } if o == offset),
                    "unexpected error: {err}"
                );
            }
        }
    }

    #[test]
    fn raw_tags_map_to_types() {
        for (tag, expected) in ALL_TYPES.iter().enumerate() {
            assert_eq!(VariableType::from_raw(tag as i32), Some(*expected));
        }
        assert_eq!(VariableType::from_raw(6), None);
        assert_eq!(VariableType::from_raw(-1), None);
    }

    #[test]
    fn variable_type_size_returns_correct_values() {
        assert_eq!(VariableType::Char.size(), 1);
        assert_eq!(VariableType::Bool.size(), 1);
        assert_eq!(VariableType::Int32.size(), 4);
        assert_eq!(VariableType::BitField.size(), 4);
        assert_eq!(VariableType::Float32.size(), 4);
        assert_eq!(VariableType::Float64.size(), 8);
    }

    #[test]
    fn type_mismatch_is_a_conversion_error() {
        let data = [0u8; 8];
        let err = f32::from_bytes(&data, &info(VariableType::Int32, 0, 1)).unwrap_err();
        assert!(matches!(err, TelemetryError::TypeConversion { .. }));
        assert!(bool::from_bytes(&data, &info(VariableType::Bool, 0, 1)).is_ok());
    }

    #[test]
    fn arrays_decode_every_element() {
        let mut data = vec![0u8; 2 + 3 * 4];
        for (i, v) in [1.5f32, -2.0, 8.25].iter().enumerate() {
            data[2 + i * 4..6 + i * 4].copy_from_slice(&v.to_le_bytes());
        }
        let values = Vec::<f32>::from_bytes(&data, &info(VariableType::Float32, 2, 3)).unwrap();
        assert_eq!(values, vec![1.5, -2.0, 8.25]);

        let short = &data[..10];
        assert!(Vec::<f32>::from_bytes(short, &info(VariableType::Float32, 2, 3)).is_err());
    }

    #[test]
    fn byte_len_scales_with_count() {
        assert_eq!(info(VariableType::Float64, 0, 6).byte_len(), 48);
        assert_eq!(info(VariableType::Bool, 0, 64).byte_len(), 64);
    }

    #[test]
    fn telemetry_variable_owns_a_sized_buffer() {
        let mut variable = TelemetryVariable::new(info(VariableType::Int32, 40, 2));
        assert_eq!(variable.bytes().len(), 8);
        assert_eq!(variable.values(), vec![Value::Int32(0), Value::Int32(0)]);

        variable.buffer_mut()[4..8].copy_from_slice(&77i32.to_le_bytes());
        assert_eq!(variable.get::<i32>().unwrap(), 0);
        assert_eq!(variable.get_at::<i32>(1).unwrap(), 77);
        assert!(matches!(
            variable.get_at::<i32>(2),
            Err(TelemetryError::FieldNotFound { .. })
        ));
    }

    #[test]
    fn values_decode_every_type() {
        assert_eq!(Value::decode(VariableType::Char, b"A"), Some(Value::Char(b'A')));
        assert_eq!(Value::decode(VariableType::Bool, &[2]), Some(Value::Bool(true)));
        assert_eq!(
            Value::decode(VariableType::BitField, &0x8000_0001u32.to_le_bytes()),
            Some(Value::BitField(BitField(0x8000_0001)))
        );
        assert_eq!(
            Value::decode(VariableType::Float64, &1.25f64.to_le_bytes()),
            Some(Value::Float64(1.25))
        );
        assert_eq!(Value::decode(VariableType::Float64, &[0; 4]), None);
    }

    #[test]
    fn frames_decode_values() {
        let frame = TelemetryFrame::new(7i32.to_le_bytes().to_vec(), 12, SystemTime::UNIX_EPOCH);
        assert_eq!(frame.value::<i32>(&info(VariableType::Int32, 0, 1)).unwrap(), 7);
        assert_eq!(frame.tick, 12);
    }

    #[test]
    fn update_rate_poll_intervals() {
        assert_eq!(UpdateRate::Native.poll_interval(), Duration::from_millis(1));
        assert_eq!(UpdateRate::Max(10).poll_interval(), Duration::from_millis(100));
        assert_eq!(UpdateRate::Max(0).poll_interval(), Duration::from_millis(1));
        assert_eq!(UpdateRate::Max(100_000).poll_interval(), Duration::from_millis(1));
        assert_eq!(UpdateRate::default(), UpdateRate::Native);
    }
}
