//! Windows file mapping and named event access
//!
//! Follows the producer SDK: the memory map is opened with `FILE_MAP_READ`
//! and the data-valid event with `SYNCHRONIZE` only. Neither object is
//! created here; both exist only while the producer is running.

use std::ptr::NonNull;

use tracing::{debug, trace};
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::System::Memory::{
    FILE_MAP_READ, MEMORY_BASIC_INFORMATION, MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile,
    OpenFileMappingW, UnmapViewOfFile, VirtualQuery,
};
use windows::Win32::System::Threading::{
    OpenEventW, SYNCHRONIZATION_ACCESS_RIGHTS, WaitForSingleObject,
};
use windows::core::PCWSTR;

use super::{DataSignal, NamingRules, SharedMemory, WaitResult, WaitTimeout, normalize_name};
use crate::{Result, TelemetryError};

/// `SYNCHRONIZE` access right.
const SYNCHRONIZE: u32 = 0x0010_0000;
/// `INFINITE` wait.
const INFINITE_MS: u32 = u32::MAX;

/// Read-only view of a named Windows file mapping.
#[derive(Debug, Default)]
pub struct WindowsSharedMemory {
    mapping: Option<HANDLE>,
    view: Option<NonNull<u8>>,
    len: usize,
}

// SAFETY: The mapping only holds Windows handles and a read-only view pointer
// that are safe to send between threads.
unsafe impl Send for WindowsSharedMemory {}
unsafe impl Sync for WindowsSharedMemory {}

// SAFETY: `view` is a live FILE_MAP_READ view of `len` bytes until `close`.
unsafe impl SharedMemory for WindowsSharedMemory {
    fn open(&mut self, name: &str) -> Result<()> {
        let wide_name = wide_string(&normalize_name(name, NamingRules::Windows));
        trace!(name, "Opening file mapping");

        // SAFETY: `wide_name` is NUL terminated and outlives the call.
        let mapping = unsafe {
            OpenFileMappingW(FILE_MAP_READ.0, false, PCWSTR::from_raw(wide_name.as_ptr()))
                .map_err(|e| TelemetryError::windows_api_error("OpenFileMappingW", e))?
        };
        self.mapping = Some(mapping);

        // SAFETY: `mapping` is a valid file mapping handle.
        let view = unsafe { MapViewOfFile(mapping, FILE_MAP_READ, 0, 0, 0) };
        let Some(base) = NonNull::new(view.Value as *mut u8) else {
            let err = TelemetryError::windows_api_error(
                "MapViewOfFile",
                windows::core::Error::from_thread(),
            );
            self.close();
            return Err(err);
        };
        self.view = Some(base);

        // MapViewOfFile with a zero size maps the whole object; ask the VM
        // manager how large that is.
        let mut info = MEMORY_BASIC_INFORMATION::default();
        // SAFETY: `info` is a valid out buffer of the size passed.
        let written = unsafe {
            VirtualQuery(
                Some(base.as_ptr() as *const _),
                &mut info,
                std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if written == 0 || info.RegionSize == 0 {
            let err =
                TelemetryError::windows_api_error("VirtualQuery", windows::core::Error::from_thread());
            self.close();
            return Err(err);
        }
        self.len = info.RegionSize;

        debug!(name, len = self.len, "Mapped file mapping view");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(view) = self.view.take() {
            let addr = MEMORY_MAPPED_VIEW_ADDRESS { Value: view.as_ptr() as *mut _ };
            // SAFETY: `addr` is the view returned by MapViewOfFile.
            let _ = unsafe { UnmapViewOfFile(addr) };
        }
        if let Some(mapping) = self.mapping.take() {
            // SAFETY: `mapping` was opened by OpenFileMappingW and is closed once.
            let _ = unsafe { CloseHandle(mapping) };
        }
        self.len = 0;
    }

    fn is_open(&self) -> bool {
        self.mapping.is_some() && self.view.is_some()
    }

    fn as_ptr(&self) -> Option<NonNull<u8>> {
        self.view
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for WindowsSharedMemory {
    fn drop(&mut self) {
        self.close();
    }
}

/// Named Windows event opened with `SYNCHRONIZE` access.
#[derive(Debug, Default)]
pub struct WindowsEvent {
    handle: Option<HANDLE>,
}

// SAFETY: Windows event handles are thread-safe kernel objects.
unsafe impl Send for WindowsEvent {}
unsafe impl Sync for WindowsEvent {}

impl DataSignal for WindowsEvent {
    fn create(&mut self, name: &str) -> Result<()> {
        let wide_name = wide_string(&normalize_name(name, NamingRules::Windows));
        // SAFETY: `wide_name` is NUL terminated and outlives the call.
        let handle = unsafe {
            OpenEventW(
                SYNCHRONIZATION_ACCESS_RIGHTS(SYNCHRONIZE),
                false,
                PCWSTR::from_raw(wide_name.as_ptr()),
            )
            .map_err(|e| TelemetryError::windows_api_error("OpenEventW", e))?
        };
        self.handle = Some(handle);
        debug!(name, "Opened data valid event");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            // SAFETY: `handle` was opened by OpenEventW and is closed once.
            let _ = unsafe { CloseHandle(handle) };
        }
    }

    fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    fn wait(&mut self, timeout: WaitTimeout) -> Result<WaitResult> {
        let handle =
            self.handle.ok_or_else(|| TelemetryError::connection_failed("data signal is not open"))?;
        let ms = match timeout {
            WaitTimeout::Infinite => INFINITE_MS,
            WaitTimeout::Finite(d) => d.as_millis().min(u128::from(INFINITE_MS - 1)) as u32,
        };

        // SAFETY: `handle` is a valid event handle.
        let result = unsafe { WaitForSingleObject(handle, ms) };
        match result {
            WAIT_OBJECT_0 => Ok(WaitResult::Signaled),
            WAIT_TIMEOUT => Ok(WaitResult::Timeout),
            _ => Err(TelemetryError::windows_api_error(
                "WaitForSingleObject",
                windows::core::Error::from_thread(),
            )),
        }
    }
}

impl Drop for WindowsEvent {
    fn drop(&mut self) {
        self.close();
    }
}

/// Convert string to null-terminated wide string for Windows APIs
pub(crate) fn wide_string(s: &str) -> Vec<u16> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}
