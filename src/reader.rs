//! Telemetry session reader.
//!
//! [`SessionReader`] owns one shared-memory handle and one signal handle and
//! turns the producer's rotating buffers into a private, tick-consistent
//! snapshot. The host polls it once per tick:
//!
//! ```rust,no_run
//! use irsdk_shm::SessionReader;
//!
//! let mut reader = SessionReader::native();
//! if reader.startup() && reader.update_session_info() {
//!     println!("session: {} bytes", reader.session_info().len());
//! }
//! if reader.update_telemetry() {
//!     let speed: f32 = reader.value("Speed").unwrap_or_default();
//!     println!("tick {:?}: {speed} m/s", reader.last_tick());
//! }
//! ```
//!
//! Every operation is synchronous. The only wait is a zero-timeout poll of
//! the data signal, so no call blocks for a meaningful time. Expected
//! conditions (producer absent, no new frame, torn copy, rewind) are reported
//! as `false` and logged; they never surface as errors.

use std::collections::HashMap;
use std::sync::atomic::{Ordering, fence};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, trace, warn};

use crate::config::ReaderConfig;
use crate::platform::{DataSignal, NativeSharedMemory, NativeSignal, SharedMemory, WaitTimeout};
use crate::schema::{HEADER_SIZE, HeaderView, IRSDK_VER, read_variable_descriptors};
use crate::types::{TelemetryFrame, TelemetryVariable, VarData, VariableInfo};
use crate::{Result, TelemetryError};

/// Copy attempts per frame before a torn buffer is abandoned.
const COPY_ATTEMPTS: usize = 2;

/// Reader for one producer connection.
#[derive(Debug)]
pub struct SessionReader<M: SharedMemory = NativeSharedMemory, S: DataSignal = NativeSignal> {
    config: ReaderConfig,
    memory: M,
    signal: S,
    /// Newest tick copied; `None` accepts any tick.
    last_tick: Option<i32>,
    /// Last session-info counter consumed; `None` accepts any counter.
    last_session_update: Option<i32>,
    snapshot: Vec<u8>,
    scratch: Vec<u8>,
    has_snapshot: bool,
    last_update: Option<SystemTime>,
    variables: Vec<VariableInfo>,
    index: HashMap<String, usize>,
    session_info: String,
}

impl SessionReader {
    /// Reader for the well-known producer objects on this platform.
    pub fn native() -> Self {
        Self::new(ReaderConfig::default())
    }

    /// Reader for the objects named in `config`.
    pub fn new(config: ReaderConfig) -> Self {
        Self::with_handles(config, NativeSharedMemory::default(), NativeSignal::default())
    }
}

impl<M: SharedMemory, S: DataSignal> SessionReader<M, S> {
    /// Reader over caller-supplied handles. Nothing is opened until [`startup`](Self::startup).
    pub fn with_handles(config: ReaderConfig, memory: M, signal: S) -> Self {
        Self {
            config,
            memory,
            signal,
            last_tick: None,
            last_session_update: None,
            snapshot: Vec::new(),
            scratch: Vec::new(),
            has_snapshot: false,
            last_update: None,
            variables: Vec::new(),
            index: HashMap::new(),
            session_info: String::new(),
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Open the memory map and the data signal.
    ///
    /// All or nothing: if the signal cannot be opened the mapping is released
    /// again. Returns true immediately when already initialized.
    pub fn startup(&mut self) -> bool {
        if self.memory.is_open() {
            return true;
        }

        if let Err(error) = self.memory.open(&self.config.memory_map_name) {
            debug!(name = %self.config.memory_map_name, %error, "Telemetry memory map unavailable");
            return false;
        }
        self.last_tick = None;

        if self.memory.len() < HEADER_SIZE {
            warn!(len = self.memory.len(), "Memory map smaller than the producer header");
            self.shutdown();
            return false;
        }

        if let Err(error) = self.signal.create(&self.config.data_event_name) {
            warn!(name = %self.config.data_event_name, %error, "Data signal unavailable, releasing memory map");
            self.shutdown();
            return false;
        }

        if let Some(header) = self.header() {
            if let Some(ver) = header.ver().filter(|v| *v != IRSDK_VER) {
                warn!(ver, expected = IRSDK_VER, "Unexpected producer header version");
            }
            info!(
                len = self.memory.len(),
                tick_rate = header.tick_rate(),
                num_vars = header.num_vars(),
                "Opened telemetry memory map"
            );
        }
        true
    }

    /// Release both handles and forget all per-connection state.
    ///
    /// Safe in any state, including never started.
    pub fn shutdown(&mut self) {
        if self.memory.is_open() {
            debug!("Shutting down telemetry reader");
        }
        self.memory.close();
        self.signal.close();
        self.last_tick = None;
        self.last_session_update = None;
        self.snapshot = Vec::new();
        self.scratch = Vec::new();
        self.has_snapshot = false;
        self.last_update = None;
        self.variables.clear();
        self.index.clear();
        self.session_info.clear();
    }

    /// True while the memory map is open.
    pub fn is_initialized(&self) -> bool {
        self.memory.is_open()
    }

    /// True while initialized and the producer's status bit is set.
    pub fn is_connected(&self) -> bool {
        self.header().is_some_and(|header| header.is_connected())
    }

    fn header(&self) -> Option<HeaderView<'_>> {
        self.memory.region().map(HeaderView::new)
    }

    /// Capture a new frame if the producer published one.
    ///
    /// Returns true only when a fresh, consistent copy now sits in the
    /// snapshot.
    pub fn update_telemetry(&mut self) -> bool {
        if !self.is_initialized() || !self.is_connected() {
            return false;
        }

        if self.variables.is_empty() {
            self.rebuild_variables();
        }

        let Some(region) = self.memory.region() else {
            return false;
        };
        let header = HeaderView::new(region);
        if !header.is_connected() {
            self.last_tick = None;
            return false;
        }

        match self.signal.wait(WaitTimeout::POLL) {
            Ok(result) if result.is_signaled() => {}
            Ok(_) => {
                trace!("No data signal this poll");
                return false;
            }
            Err(error) => {
                debug!(%error, "Data signal poll failed");
                return false;
            }
        }

        let Some((latest, buffer)) = header.latest_buffer() else {
            debug!(num_buf = header.num_buf(), "Header declares no ring buffers");
            return false;
        };

        if let Some(last) = self.last_tick {
            if buffer.tick_count < last {
                debug!(tick = buffer.tick_count, last, "Tick count went backwards, resetting");
                self.last_tick = None;
                return false;
            }
            if buffer.tick_count == last {
                trace!(tick = last, "No new frame");
                return false;
            }
        }

        let buf_len = match header.buf_len() {
            Some(len) if len > 0 => len as usize,
            declared => {
                warn!(?declared, "Producer declared a non-positive buffer length");
                self.snapshot = Vec::new();
                self.scratch = Vec::new();
                self.has_snapshot = false;
                return false;
            }
        };
        let in_bounds = usize::try_from(buffer.buf_offset)
            .ok()
            .and_then(|offset| offset.checked_add(buf_len))
            .is_some_and(|end| end <= self.memory.len());
        if !in_bounds {
            warn!(
                buffer = latest,
                offset = buffer.buf_offset,
                buf_len,
                region_len = self.memory.len(),
                "Ring buffer lies outside the memory map"
            );
            return false;
        }

        if self.snapshot.len() != buf_len {
            debug!(old = self.snapshot.len(), new = buf_len, "Resizing telemetry snapshot");
            self.snapshot = vec![0u8; buf_len];
            self.scratch = vec![0u8; buf_len];
            self.has_snapshot = false;
        }

        self.copy_buffer(latest, buffer.buf_offset as usize)
    }

    /// Copy ring buffer `index` into the snapshot, detecting torn reads.
    fn copy_buffer(&mut self, index: usize, offset: usize) -> bool {
        for attempt in 0..COPY_ATTEMPTS {
            let Some(before) = self.header().and_then(|h| h.tick_count(index)) else {
                return false;
            };
            fence(Ordering::Acquire);
            if !self.memory.copy_out(offset, &mut self.scratch) {
                return false;
            }
            fence(Ordering::Acquire);
            let after = self.header().and_then(|h| h.tick_count(index));

            if after == Some(before) {
                std::mem::swap(&mut self.snapshot, &mut self.scratch);
                self.has_snapshot = true;
                self.last_tick = Some(before);
                self.last_update = Some(SystemTime::now());
                trace!(tick = before, buffer = index, "Captured telemetry frame");
                return true;
            }
            debug!(buffer = index, before, ?after, attempt, "Buffer rewritten during copy");
        }

        warn!(buffer = index, "Abandoning torn telemetry frame");
        false
    }

    fn rebuild_variables(&mut self) {
        let Some(header) = self.header() else {
            return;
        };
        let variables = read_variable_descriptors(&header);
        let mut index = HashMap::with_capacity(variables.len());
        for (i, var) in variables.iter().enumerate() {
            index.entry(var.name.clone()).or_insert(i);
        }
        self.variables = variables;
        self.index = index;
    }

    /// Wall-clock time of the last captured frame.
    pub fn last_telemetry_update(&self) -> Option<SystemTime> {
        self.last_update
    }

    /// [`last_telemetry_update`](Self::last_telemetry_update) as milliseconds
    /// since the Unix epoch, 0 when no frame has been captured.
    pub fn last_telemetry_update_millis(&self) -> f64 {
        self.last_update
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0.0, |d| d.as_secs_f64() * 1000.0)
    }

    /// Refresh the cached session-info text if the producer changed it.
    ///
    /// Starts the reader if needed. Returns true only when the text changed.
    pub fn update_session_info(&mut self) -> bool {
        if !self.startup() {
            return false;
        }
        let Some(header) = self.header() else {
            return false;
        };
        let Some(counter) = header.session_info_update() else {
            return false;
        };
        if self.last_session_update.is_some_and(|last| counter <= last) {
            return false;
        }

        let text = header.session_info_offset().and_then(|offset| {
            let offset = usize::try_from(offset).ok()?;
            let limit = header.session_info_len().and_then(|len| usize::try_from(len).ok());
            let max_len = limit.filter(|len| *len > 0).unwrap_or(usize::MAX);
            header.region().c_string(offset, max_len)
        });
        let Some(text) = text else {
            warn!(
                offset = header.session_info_offset(),
                len = header.session_info_len(),
                "Session info lies outside the memory map"
            );
            return false;
        };

        debug!(counter, len = text.len(), "Session info updated");
        self.session_info = text;
        self.last_session_update = Some(counter);
        true
    }

    /// The cached session-info text, empty until first read.
    pub fn session_info(&self) -> &str {
        &self.session_info
    }

    /// Variable descriptors in producer declaration order.
    ///
    /// Empty until the first telemetry update after connecting.
    pub fn variable_descriptors(&self) -> &[VariableInfo] {
        &self.variables
    }

    /// Descriptor of the variable called `name`.
    pub fn variable_info(&self, name: &str) -> Option<&VariableInfo> {
        self.index.get(name).map(|i| &self.variables[*i])
    }

    /// A fresh value handle for the variable called `name`.
    pub fn variable(&self, name: &str) -> Option<TelemetryVariable> {
        self.variable_info(name).cloned().map(TelemetryVariable::new)
    }

    /// Copy the described value out of the current snapshot.
    ///
    /// Returns false, leaving the handle untouched, when no snapshot has been
    /// captured or the value does not fit in it.
    pub fn read_variable(&self, variable: &mut TelemetryVariable) -> bool {
        let Some(snapshot) = self.snapshot() else {
            return false;
        };
        let info = variable.info();
        let len = info.byte_len();
        if variable.bytes().len() != len {
            return false;
        }
        let Some(source) = info.offset.checked_add(len).and_then(|end| snapshot.get(info.offset..end))
        else {
            return false;
        };
        variable.buffer_mut().copy_from_slice(source);
        true
    }

    /// Decode the variable called `name` from the current snapshot.
    pub fn value<T: VarData>(&self, name: &str) -> Result<T> {
        let info = self
            .variable_info(name)
            .ok_or_else(|| TelemetryError::FieldNotFound { field: name.to_string() })?;
        let snapshot = self
            .snapshot()
            .ok_or_else(|| TelemetryError::connection_failed("no telemetry frame captured"))?;
        T::from_bytes(snapshot, info)
    }

    /// The current snapshot bytes, `None` before the first capture.
    pub fn snapshot(&self) -> Option<&[u8]> {
        self.has_snapshot.then_some(self.snapshot.as_slice())
    }

    /// An immutable copy of the current snapshot.
    pub fn frame(&self) -> Option<TelemetryFrame> {
        let data = self.snapshot()?;
        Some(TelemetryFrame::new(data, self.last_tick?, self.last_update?))
    }

    /// Tick of the last captured frame.
    pub fn last_tick(&self) -> Option<i32> {
        self.last_tick
    }

    /// Producer tick rate in Hz while initialized.
    pub fn tick_rate(&self) -> Option<i32> {
        self.header().and_then(|h| h.tick_rate())
    }
}

impl<M: SharedMemory, S: DataSignal> Drop for SessionReader<M, S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
