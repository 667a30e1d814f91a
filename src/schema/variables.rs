//! Variable descriptor table decoding.
//!
//! Each entry follows the SDK's `irsdk_varHeader` layout:
//!
//! ```c
//! typedef struct irsdk_varHeader
//! {
//!     int type;                           // irsdk_VarType
//!     int offset;                         // offset from buffer start
//!     int count;                          // number of elements
//!     bool countAsTime;
//!     char pad[3];
//!     char name[IRSDK_MAX_STRING];        // 32 bytes
//!     char desc[IRSDK_MAX_DESC];          // 64 bytes
//!     char unit[IRSDK_MAX_STRING];        // 32 bytes
//! } irsdk_varHeader;
//! ```
//!
//! Entries are decoded into owned [`VariableInfo`] values so nothing keeps a
//! raw address into the mapping once the connection closes.

use tracing::{debug, trace, warn};

use super::{HeaderView, Region};
use crate::types::{VariableInfo, VariableType};

/// Size of one descriptor entry in bytes.
pub const VAR_HEADER_SIZE: usize = 144;

/// Capacity of the name and unit fields.
pub const MAX_STRING: usize = 32;

/// Capacity of the description field.
pub const MAX_DESC: usize = 64;

const TYPE: usize = 0;
const OFFSET: usize = 4;
const COUNT: usize = 8;
const COUNT_AS_TIME: usize = 12;
const NAME: usize = 16;
const DESC: usize = 48;
const UNIT: usize = 112;

/// Decode the descriptor entry starting at `base`.
///
/// Returns `None` for entries that are out of bounds or malformed.
pub fn read_variable_descriptor(region: Region<'_>, base: usize) -> Option<VariableInfo> {
    if base.checked_add(VAR_HEADER_SIZE).is_none_or(|end| end > region.len()) {
        warn!(base, region_len = region.len(), "Variable descriptor outside mapped region");
        return None;
    }

    let raw_type = region.read_i32(base + TYPE)?;
    let offset = region.read_i32(base + OFFSET)?;
    let count = region.read_i32(base + COUNT)?;
    let name = region.c_string(base + NAME, MAX_STRING)?;

    let Some(data_type) = VariableType::from_raw(raw_type) else {
        warn!(name = %name, raw_type, "Skipping variable with unknown type tag");
        return None;
    };
    if name.is_empty() {
        warn!(base, "Skipping variable with empty name");
        return None;
    }
    if offset < 0 || count <= 0 {
        warn!(name = %name, offset, count, "Skipping variable with invalid placement");
        return None;
    }

    let info = VariableInfo {
        name,
        data_type,
        offset: offset as usize,
        count: count as usize,
        count_as_time: region.read_u8(base + COUNT_AS_TIME)? != 0,
        units: region.c_string(base + UNIT, MAX_STRING)?,
        description: region.c_string(base + DESC, MAX_DESC)?,
    };
    trace!(name = %info.name, ty = ?info.data_type, offset = info.offset, count = info.count, "Decoded variable");
    Some(info)
}

/// Decode the header's whole descriptor table in declaration order.
pub fn read_variable_descriptors(header: &HeaderView<'_>) -> Vec<VariableInfo> {
    let region = header.region();
    let (Some(num_vars), Some(table_offset)) = (header.num_vars(), header.var_header_offset())
    else {
        return Vec::new();
    };
    if num_vars <= 0 || table_offset < 0 {
        debug!(num_vars, table_offset, "Header declares no variables");
        return Vec::new();
    }

    let table_offset = table_offset as usize;
    let variables: Vec<VariableInfo> = (0..num_vars as usize)
        .filter_map(|i| {
            let base = i.checked_mul(VAR_HEADER_SIZE)?.checked_add(table_offset)?;
            read_variable_descriptor(region, base)
        })
        .collect();

    debug!(declared = num_vars, decoded = variables.len(), "Built variable descriptor table");
    variables
}
