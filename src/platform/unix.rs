//! POSIX shared memory (`shm_open` + `mmap`) and named semaphores.
//!
//! The producer's "data valid" event becomes a named semaphore on POSIX
//! systems. It is opened with `O_CREAT` so that a reader started before the
//! producer still gets a handle; the producer posts it once per frame.

use std::ffi::{CStr, CString};
use std::io;
use std::ptr::{self, NonNull};
use std::time::Duration;

use tracing::{debug, trace};

use super::{DataSignal, NamingRules, SharedMemory, WaitResult, WaitTimeout, normalize_name};
use crate::{Result, TelemetryError};

/// Read-only POSIX shared-memory mapping.
#[derive(Debug)]
pub struct PosixSharedMemory {
    fd: libc::c_int,
    data: Option<NonNull<u8>>,
    len: usize,
}

// SAFETY: the mapping is read-only and the raw pointer is only dereferenced
// through bounds-checked `Region` views.
unsafe impl Send for PosixSharedMemory {}
unsafe impl Sync for PosixSharedMemory {}

impl Default for PosixSharedMemory {
    fn default() -> Self {
        Self { fd: -1, data: None, len: 0 }
    }
}

// SAFETY: `data` is a live `PROT_READ` mapping of exactly `len` bytes until `close`.
unsafe impl SharedMemory for PosixSharedMemory {
    fn open(&mut self, name: &str) -> Result<()> {
        let shm_name = c_name(name)?;
        trace!(name = ?shm_name, "Opening POSIX shared memory");

        self.fd = shm_open_read_only(&shm_name);
        if self.fd == -1 {
            return Err(TelemetryError::os_error(format!("shm_open({})", shm_name.to_string_lossy())));
        }

        // SAFETY: all-zero is a valid `stat`, which fstat overwrites.
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        // SAFETY: `fd` is an open descriptor and `stat` is a valid out pointer.
        if unsafe { libc::fstat(self.fd, &mut stat) } == -1 {
            let err = TelemetryError::os_error("fstat");
            self.close();
            return Err(err);
        }

        let len = usize::try_from(stat.st_size).unwrap_or(0);
        if len == 0 {
            self.close();
            return Err(TelemetryError::connection_failed(format!(
                "shared memory {} is empty",
                shm_name.to_string_lossy()
            )));
        }

        // SAFETY: mapping `len` bytes of an open descriptor read-only; the
        // result is checked against MAP_FAILED before use.
        let base = unsafe {
            libc::mmap(ptr::null_mut(), len, libc::PROT_READ, libc::MAP_SHARED, self.fd, 0)
        };
        if base == libc::MAP_FAILED {
            let err = TelemetryError::os_error("mmap");
            self.close();
            return Err(err);
        }

        self.data = NonNull::new(base.cast::<u8>());
        self.len = len;
        debug!(name = ?shm_name, len, "Mapped POSIX shared memory");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(data) = self.data.take() {
            // SAFETY: `data`/`len` describe the mapping created in `open`.
            unsafe { libc::munmap(data.as_ptr().cast(), self.len) };
        }
        self.len = 0;
        if self.fd != -1 {
            // SAFETY: `fd` was returned by shm_open and is closed exactly once.
            unsafe { libc::close(self.fd) };
            self.fd = -1;
        }
    }

    fn is_open(&self) -> bool {
        self.fd != -1 && self.data.is_some()
    }

    fn as_ptr(&self) -> Option<NonNull<u8>> {
        self.data
    }

    fn len(&self) -> usize {
        if self.data.is_some() { self.len } else { 0 }
    }
}

impl Drop for PosixSharedMemory {
    fn drop(&mut self) {
        self.close();
    }
}

/// Named POSIX semaphore standing in for the producer's data-valid event.
#[derive(Debug, Default)]
pub struct PosixSemaphore {
    sem: Option<NonNull<libc::sem_t>>,
}

// SAFETY: named semaphores are process-shared kernel objects; every
// operation on the handle is thread safe.
unsafe impl Send for PosixSemaphore {}
unsafe impl Sync for PosixSemaphore {}

impl DataSignal for PosixSemaphore {
    fn create(&mut self, name: &str) -> Result<()> {
        let sem_name = c_name(name)?;
        // SAFETY: `sem_name` is NUL terminated; mode and initial value are
        // passed as `c_uint` as the variadic ABI expects.
        let sem = unsafe {
            libc::sem_open(
                sem_name.as_ptr(),
                libc::O_CREAT,
                0o666 as libc::c_uint,
                0 as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(TelemetryError::os_error(format!("sem_open({})", sem_name.to_string_lossy())));
        }

        self.sem = NonNull::new(sem);
        debug!(name = ?sem_name, "Opened POSIX semaphore");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(sem) = self.sem.take() {
            // SAFETY: `sem` came from sem_open and is closed exactly once.
            unsafe { libc::sem_close(sem.as_ptr()) };
        }
    }

    fn is_valid(&self) -> bool {
        self.sem.is_some()
    }

    fn wait(&mut self, timeout: WaitTimeout) -> Result<WaitResult> {
        let sem = self.sem.ok_or_else(|| TelemetryError::connection_failed("data signal is not open"))?;

        match timeout {
            WaitTimeout::Infinite => wait_forever(sem),
            WaitTimeout::Finite(duration) if duration.is_zero() => try_wait(sem),
            WaitTimeout::Finite(duration) => timed_wait(sem, duration),
        }
    }
}

impl Drop for PosixSemaphore {
    fn drop(&mut self) {
        self.close();
    }
}

fn c_name(name: &str) -> Result<CString> {
    CString::new(normalize_name(name, NamingRules::Posix))
        .map_err(|e| TelemetryError::connection_failed_with_source(format!("invalid object name {name:?}"), Box::new(e)))
}

#[cfg(target_vendor = "apple")]
fn shm_open_read_only(name: &CStr) -> libc::c_int {
    // SAFETY: `name` is NUL terminated; no mode is needed without O_CREAT.
    unsafe { libc::shm_open(name.as_ptr(), libc::O_RDONLY) }
}

#[cfg(not(target_vendor = "apple"))]
fn shm_open_read_only(name: &CStr) -> libc::c_int {
    // SAFETY: `name` is NUL terminated.
    unsafe { libc::shm_open(name.as_ptr(), libc::O_RDONLY, 0o666 as libc::mode_t) }
}

fn wait_forever(sem: NonNull<libc::sem_t>) -> Result<WaitResult> {
    loop {
        // SAFETY: `sem` is an open semaphore handle.
        if unsafe { libc::sem_wait(sem.as_ptr()) } == 0 {
            return Ok(WaitResult::Signaled);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(TelemetryError::Os { operation: "sem_wait".to_string(), source: err });
        }
    }
}

fn try_wait(sem: NonNull<libc::sem_t>) -> Result<WaitResult> {
    loop {
        // SAFETY: `sem` is an open semaphore handle.
        if unsafe { libc::sem_trywait(sem.as_ptr()) } == 0 {
            return Ok(WaitResult::Signaled);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EAGAIN) => return Ok(WaitResult::Timeout),
            Some(libc::EINTR) => continue,
            _ => return Err(TelemetryError::Os { operation: "sem_trywait".to_string(), source: err }),
        }
    }
}

#[cfg(not(target_vendor = "apple"))]
fn timed_wait(sem: NonNull<libc::sem_t>, duration: Duration) -> Result<WaitResult> {
    // sem_timedwait takes an absolute CLOCK_REALTIME deadline.
    // SAFETY: all-zero is a valid `timespec`, which clock_gettime overwrites.
    let mut deadline: libc::timespec = unsafe { std::mem::zeroed() };
    // SAFETY: `deadline` is a valid out pointer.
    if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut deadline) } == -1 {
        return Err(TelemetryError::os_error("clock_gettime"));
    }
    let nanos = deadline.tv_nsec as i64 + i64::from(duration.subsec_nanos());
    deadline.tv_sec += (duration.as_secs() as i64 + nanos / 1_000_000_000) as libc::time_t;
    deadline.tv_nsec = (nanos % 1_000_000_000) as _;

    loop {
        // SAFETY: `sem` is an open semaphore handle and `deadline` is initialized.
        if unsafe { libc::sem_timedwait(sem.as_ptr(), &deadline) } == 0 {
            return Ok(WaitResult::Signaled);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ETIMEDOUT) => return Ok(WaitResult::Timeout),
            Some(libc::EINTR) => continue,
            _ => return Err(TelemetryError::Os { operation: "sem_timedwait".to_string(), source: err }),
        }
    }
}

// Apple targets have no sem_timedwait.
#[cfg(target_vendor = "apple")]
fn timed_wait(sem: NonNull<libc::sem_t>, duration: Duration) -> Result<WaitResult> {
    const POLL_STEP: Duration = Duration::from_millis(1);

    let deadline = std::time::Instant::now() + duration;
    loop {
        if try_wait(sem)?.is_signaled() {
            return Ok(WaitResult::Signaled);
        }
        let now = std::time::Instant::now();
        if now >= deadline {
            return Ok(WaitResult::Timeout);
        }
        std::thread::sleep(POLL_STEP.min(deadline - now));
    }
}
