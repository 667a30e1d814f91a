//! Platform shared-memory and signal primitives
//!
//! The producer publishes its telemetry through two named OS objects: a
//! read-only memory mapping and a binary "data valid" signal. This module
//! hides the incompatible Windows and POSIX APIs behind two capability sets:
//!
//! - [`SharedMemory`]: open/close/map a named region read-only
//! - [`DataSignal`]: open/create a named signal and wait on it with a timeout
//!
//! One implementation of each is compiled per target and exposed through the
//! [`NativeSharedMemory`] and [`NativeSignal`] aliases. Nothing outside this
//! module depends on which implementation is active.
//!
//! # Usage
//!
//! ```rust,no_run
//! use irsdk_shm::platform::{
//!     DataSignal, NativeSharedMemory, NativeSignal, SharedMemory, WaitTimeout,
//!     DATA_VALID_EVENT_NAME, MEMORY_MAP_NAME,
//! };
//!
//! let mut memory = NativeSharedMemory::default();
//! let mut signal = NativeSignal::default();
//! if memory.open(MEMORY_MAP_NAME).is_ok() && signal.create(DATA_VALID_EVENT_NAME).is_ok() {
//!     let fired = signal.wait(WaitTimeout::POLL).is_ok_and(|r| r.is_signaled());
//!     println!("mapped {} bytes, signaled: {}", memory.len(), fired);
//! }
//! ```

mod naming;

#[cfg(unix)]
mod unix;
#[cfg(not(any(unix, windows)))]
mod unsupported;
#[cfg(windows)]
mod windows;

use std::ptr::NonNull;
use std::time::Duration;

use crate::Result;
use crate::schema::Region;

pub use naming::{NamingRules, normalize_name};

#[cfg(unix)]
pub use unix::{PosixSemaphore, PosixSharedMemory};
#[cfg(not(any(unix, windows)))]
pub use unsupported::{UnsupportedSharedMemory, UnsupportedSignal};
#[cfg(windows)]
pub use windows::{WindowsEvent, WindowsSharedMemory};

/// Well-known name of the producer's telemetry memory map.
pub const MEMORY_MAP_NAME: &str = "Local\\IRSDKMemMapFileName";

/// Well-known name of the producer's "new data may be available" signal.
pub const DATA_VALID_EVENT_NAME: &str = "Local\\IRSDKDataValidEvent";

/// Shared-memory implementation for the build target.
#[cfg(unix)]
pub type NativeSharedMemory = PosixSharedMemory;
/// Shared-memory implementation for the build target.
#[cfg(windows)]
pub type NativeSharedMemory = WindowsSharedMemory;
/// Shared-memory implementation for the build target.
#[cfg(not(any(unix, windows)))]
pub type NativeSharedMemory = UnsupportedSharedMemory;

/// Signal implementation for the build target.
#[cfg(unix)]
pub type NativeSignal = PosixSemaphore;
/// Signal implementation for the build target.
#[cfg(windows)]
pub type NativeSignal = WindowsEvent;
/// Signal implementation for the build target.
#[cfg(not(any(unix, windows)))]
pub type NativeSignal = UnsupportedSignal;

/// A named, read-only, OS-backed memory mapping.
///
/// Opening while already open is not supported; callers check
/// [`is_open`](SharedMemory::is_open) first.
///
/// # Safety
///
/// While [`is_open`](SharedMemory::is_open) returns true, the pointer from
/// [`as_ptr`](SharedMemory::as_ptr) must be valid for reads of
/// [`len`](SharedMemory::len) bytes, and it must stay valid until
/// [`close`](SharedMemory::close) is called or the handle is dropped.
pub unsafe trait SharedMemory {
    /// Map the object called `name`, normalizing the name for this platform.
    fn open(&mut self, name: &str) -> Result<()>;

    /// Unmap and release the OS handle. Safe to call repeatedly or when never opened.
    fn close(&mut self);

    /// Whether a valid mapping is currently held.
    fn is_open(&self) -> bool;

    /// Base address of the mapped bytes, `None` when not open.
    fn as_ptr(&self) -> Option<NonNull<u8>>;

    /// Length of the mapping in bytes, 0 when not open.
    fn len(&self) -> usize;

    /// Bounds-checked view of the mapping, borrowing the handle.
    fn region(&self) -> Option<Region<'_>> {
        let base = self.as_ptr()?;
        // SAFETY: the trait contract guarantees `base` is readable for `len`
        // bytes while `self` is borrowed and open.
        Some(unsafe { Region::from_raw_parts(base, self.len()) })
    }

    /// Copy `dst.len()` bytes starting at `offset` out of the mapping.
    ///
    /// Returns false when the handle is closed or the range is out of bounds.
    fn copy_out(&self, offset: usize, dst: &mut [u8]) -> bool {
        self.region().is_some_and(|region| region.copy_to(offset, dst))
    }
}

/// A named cross-process binary signal posted by the producer.
///
/// A fired signal only means "some new frame may be available"; it never
/// says which buffer to read.
pub trait DataSignal {
    /// Open (or create) the signal called `name`, normalizing the name for this platform.
    fn create(&mut self, name: &str) -> Result<()>;

    /// Release the OS handle. Safe to call repeatedly or when never created.
    fn close(&mut self);

    /// Whether a valid signal handle is currently held.
    fn is_valid(&self) -> bool;

    /// Block up to `timeout` for the signal to fire.
    ///
    /// [`WaitTimeout::POLL`] returns immediately with the current state.
    fn wait(&mut self, timeout: WaitTimeout) -> Result<WaitResult>;
}

/// How long [`DataSignal::wait`] may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTimeout {
    /// Wait at most this long; zero is a non-blocking poll.
    Finite(Duration),
    /// Wait until the signal fires.
    Infinite,
}

impl WaitTimeout {
    /// Non-blocking poll.
    pub const POLL: WaitTimeout = WaitTimeout::Finite(Duration::ZERO);

    /// Timeout from whole milliseconds.
    pub const fn from_millis(ms: u64) -> Self {
        WaitTimeout::Finite(Duration::from_millis(ms))
    }

    /// Whether this timeout never blocks.
    pub fn is_poll(&self) -> bool {
        matches!(self, WaitTimeout::Finite(d) if d.is_zero())
    }
}

impl From<Duration> for WaitTimeout {
    fn from(duration: Duration) -> Self {
        WaitTimeout::Finite(duration)
    }
}

/// Result of waiting for a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    Signaled,
    Timeout,
}

impl WaitResult {
    /// True when the signal fired within the wait window.
    pub fn is_signaled(self) -> bool {
        self == WaitResult::Signaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_timeout_is_zero() {
        assert!(WaitTimeout::POLL.is_poll());
        assert!(WaitTimeout::from_millis(0).is_poll());
        assert!(!WaitTimeout::from_millis(5).is_poll());
        assert!(!WaitTimeout::Infinite.is_poll());
        assert_eq!(WaitTimeout::from(Duration::from_millis(16)), WaitTimeout::from_millis(16));
    }

    #[test]
    fn closed_handles_expose_nothing() {
        let mut memory = NativeSharedMemory::default();
        assert!(!memory.is_open());
        assert!(memory.as_ptr().is_none());
        assert_eq!(memory.len(), 0);
        assert!(memory.region().is_none());
        assert!(!memory.copy_out(0, &mut [0u8; 4]));
        memory.close();
        memory.close();

        let mut signal = NativeSignal::default();
        assert!(!signal.is_valid());
        assert!(signal.wait(WaitTimeout::POLL).is_err());
        signal.close();
        signal.close();
    }

    #[test]
    fn opening_a_missing_object_fails() {
        let mut memory = NativeSharedMemory::default();
        let result = memory.open("Local\\irsdk_shm_missing_region_for_tests");
        assert!(result.is_err());
        assert!(!memory.is_open());
    }

    #[test]
    fn well_known_names_match_producer() {
        assert_eq!(MEMORY_MAP_NAME, "Local\\IRSDKMemMapFileName");
        assert_eq!(DATA_VALID_EVENT_NAME, "Local\\IRSDKDataValidEvent");
    }
}
