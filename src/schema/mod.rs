//! Views over the producer's binary layout.
//!
//! The shared region starts with a fixed header, followed somewhere by a
//! variable descriptor table, the session-info text and the rotating data
//! buffers. All of it is addressed through documented byte offsets:
//! - [`Region`] is the bounds-checked, borrowed view of the mapping
//! - [`HeaderView`] reads header fields and picks the newest ring buffer
//! - [`read_variable_descriptors`] decodes the descriptor table

pub mod header;
mod region;
pub mod variables;

pub use header::{
    HEADER_SIZE, HeaderView, IRSDK_VER, MAX_BUFFERS, RingBufferDescriptor, STATUS_CONNECTED,
};
pub use region::Region;
pub use variables::{VAR_HEADER_SIZE, read_variable_descriptor, read_variable_descriptors};
