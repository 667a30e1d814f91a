//! Producer header view.
//!
//! The header sits at offset 0 of the shared region and follows the SDK's
//! `irsdk_header` layout:
//!
//! ```c
//! typedef struct irsdk_header
//! {
//!     int ver;                    // api version, 2 for current producers
//!     int status;                 // bitfield, 0x1 = connected
//!     int tickRate;               // ticks per second
//!     int sessionInfoUpdate;      // incremented when session info changes
//!     int sessionInfoLen;         // length in bytes of session info string
//!     int sessionInfoOffset;      // offset to session info string
//!     int numVars;                // length of the var header array
//!     int varHeaderOffset;        // offset to varHeader[0]
//!     int numBuf;                 // number of ring buffers (<= 4)
//!     int bufLen;                 // length in bytes of each buffer
//!     int pad1[2];
//!     irsdk_varBuf varBuf[4];     // {tickCount, bufOffset, pad[2]}
//! } irsdk_header;
//! ```
//!
//! The producer rewrites these fields while we read them, so the view never
//! copies the struct out. Each getter performs one bounds-checked read and
//! callers re-read fields whenever they need a fresh value.

use super::Region;

/// Header version written by current producers.
pub const IRSDK_VER: i32 = 2;

/// Status bit set while the producer is publishing.
pub const STATUS_CONNECTED: i32 = 0x1;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 112;

/// Maximum number of rotating buffers the header can describe.
pub const MAX_BUFFERS: usize = 4;

const VER: usize = 0;
const STATUS: usize = 4;
const TICK_RATE: usize = 8;
const SESSION_INFO_UPDATE: usize = 12;
const SESSION_INFO_LEN: usize = 16;
const SESSION_INFO_OFFSET: usize = 20;
const NUM_VARS: usize = 24;
const VAR_HEADER_OFFSET: usize = 28;
const NUM_BUF: usize = 32;
const BUF_LEN: usize = 36;
const VAR_BUF: usize = 48;
const VAR_BUF_STRIDE: usize = 16;

/// One entry of the header's ring-buffer array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingBufferDescriptor {
    /// Producer tick written into this buffer.
    pub tick_count: i32,
    /// Byte offset of the buffer from the start of the region.
    pub buf_offset: i32,
}

/// Live view of the header at the start of a region.
#[derive(Debug, Clone, Copy)]
pub struct HeaderView<'a> {
    region: Region<'a>,
}

impl<'a> HeaderView<'a> {
    /// Wrap a region. Reads against a region shorter than the header yield `None`.
    pub fn new(region: Region<'a>) -> Self {
        Self { region }
    }

    /// The region this header belongs to.
    pub fn region(&self) -> Region<'a> {
        self.region
    }

    pub fn ver(&self) -> Option<i32> {
        self.region.read_i32(VER)
    }

    pub fn status(&self) -> Option<i32> {
        self.region.read_i32(STATUS)
    }

    pub fn tick_rate(&self) -> Option<i32> {
        self.region.read_i32(TICK_RATE)
    }

    pub fn session_info_update(&self) -> Option<i32> {
        self.region.read_i32(SESSION_INFO_UPDATE)
    }

    pub fn session_info_len(&self) -> Option<i32> {
        self.region.read_i32(SESSION_INFO_LEN)
    }

    pub fn session_info_offset(&self) -> Option<i32> {
        self.region.read_i32(SESSION_INFO_OFFSET)
    }

    pub fn num_vars(&self) -> Option<i32> {
        self.region.read_i32(NUM_VARS)
    }

    pub fn var_header_offset(&self) -> Option<i32> {
        self.region.read_i32(VAR_HEADER_OFFSET)
    }

    pub fn num_buf(&self) -> Option<i32> {
        self.region.read_i32(NUM_BUF)
    }

    pub fn buf_len(&self) -> Option<i32> {
        self.region.read_i32(BUF_LEN)
    }

    /// Whether the producer reports itself as connected.
    ///
    /// Tests the connected bit rather than comparing the whole status word,
    /// so a status with extra flags set (`0x3`) still counts as connected.
    pub fn is_connected(&self) -> bool {
        self.status().is_some_and(|status| status & STATUS_CONNECTED != 0)
    }

    /// Number of usable ring buffers, clamped to the array size.
    pub fn buffer_count(&self) -> Option<usize> {
        let declared = self.num_buf()?;
        if declared <= 0 {
            return None;
        }
        Some((declared as usize).min(MAX_BUFFERS))
    }

    /// Descriptor for ring buffer `index`.
    pub fn ring_buffer(&self, index: usize) -> Option<RingBufferDescriptor> {
        if index >= MAX_BUFFERS {
            return None;
        }
        let base = VAR_BUF + index * VAR_BUF_STRIDE;
        Some(RingBufferDescriptor {
            tick_count: self.region.read_i32(base)?,
            buf_offset: self.region.read_i32(base + 4)?,
        })
    }

    /// Tick count of ring buffer `index`, read fresh from the region.
    pub fn tick_count(&self, index: usize) -> Option<i32> {
        self.ring_buffer(index).map(|buf| buf.tick_count)
    }

    /// The buffer holding the newest frame.
    ///
    /// Picks the maximum tick count among the declared buffers. On ties the
    /// lowest index wins.
    pub fn latest_buffer(&self) -> Option<(usize, RingBufferDescriptor)> {
        let count = self.buffer_count()?;
        let mut latest: Option<(usize, RingBufferDescriptor)> = None;
        for index in 0..count {
            let buf = self.ring_buffer(index)?;
            match latest {
                Some((_, best)) if buf.tick_count <= best.tick_count => {}
                _ => latest = Some((index, buf)),
            }
        }
        latest
    }
}
