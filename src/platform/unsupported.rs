//! Fallback for targets without a supported shared-memory API.

use std::ptr::NonNull;

use super::{DataSignal, SharedMemory, WaitResult, WaitTimeout};
use crate::{Result, TelemetryError};

/// Shared memory handle that can never be opened.
#[derive(Debug, Default)]
pub struct UnsupportedSharedMemory;

// SAFETY: never open, so no pointer is ever handed out.
unsafe impl SharedMemory for UnsupportedSharedMemory {
    fn open(&mut self, _name: &str) -> Result<()> {
        Err(TelemetryError::unsupported_platform("Shared memory telemetry", "Windows or Unix"))
    }

    fn close(&mut self) {}

    fn is_open(&self) -> bool {
        false
    }

    fn as_ptr(&self) -> Option<NonNull<u8>> {
        None
    }

    fn len(&self) -> usize {
        0
    }
}

/// Signal handle that can never be created.
#[derive(Debug, Default)]
pub struct UnsupportedSignal;

impl DataSignal for UnsupportedSignal {
    fn create(&mut self, _name: &str) -> Result<()> {
        Err(TelemetryError::unsupported_platform("Data valid signal", "Windows or Unix"))
    }

    fn close(&mut self) {}

    fn is_valid(&self) -> bool {
        false
    }

    fn wait(&mut self, _timeout: WaitTimeout) -> Result<WaitResult> {
        Err(TelemetryError::unsupported_platform("Data valid signal", "Windows or Unix"))
    }
}
