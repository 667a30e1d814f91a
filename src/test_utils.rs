//! In-memory producer fixture for tests and benchmarks.
//!
//! [`ProducerLayout`] builds a byte image laid out exactly like the
//! simulator's shared region. [`MockProducer`] owns such an image and hands
//! out [`MockSharedMemory`] / [`MockSignal`] handles that a
//! [`SessionReader`] can use in place of the OS objects, while the test keeps
//! writing frames, flipping the status bit and posting the signal.

#![cfg(any(test, feature = "test-utils"))]

use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

use crate::config::ReaderConfig;
use crate::platform::{DataSignal, SharedMemory, WaitResult, WaitTimeout};
use crate::reader::SessionReader;
use crate::schema::{HEADER_SIZE, IRSDK_VER, STATUS_CONNECTED, VAR_HEADER_SIZE};
use crate::types::{VariableInfo, VariableType};
use crate::{Result, TelemetryError};

const BUFFER_ALIGN: usize = 16;

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

/// Encode one descriptor table entry.
///
/// Strings longer than their field are clipped without a terminator, as the
/// producer does.
pub fn encode_var_header(info: &VariableInfo) -> [u8; VAR_HEADER_SIZE] {
    let mut entry = [0u8; VAR_HEADER_SIZE];
    entry[0..4].copy_from_slice(&(info.data_type as i32).to_le_bytes());
    entry[4..8].copy_from_slice(&(info.offset as i32).to_le_bytes());
    entry[8..12].copy_from_slice(&(info.count as i32).to_le_bytes());
    entry[12] = info.count_as_time as u8;
    put_str(&mut entry[16..48], &info.name);
    put_str(&mut entry[48..112], &info.description);
    put_str(&mut entry[112..144], &info.units);
    entry
}

fn put_str(field: &mut [u8], value: &str) {
    let len = value.len().min(field.len());
    field[..len].copy_from_slice(&value.as_bytes()[..len]);
}

fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

/// Builder for a producer region image.
#[derive(Debug, Clone)]
pub struct ProducerLayout {
    variables: Vec<(String, VariableType, usize)>,
    num_buf: usize,
    tick_rate: i32,
    session_capacity: usize,
    buffer_capacity: Option<usize>,
}

impl Default for ProducerLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl ProducerLayout {
    /// Three buffers at 60 Hz with 1 KiB reserved for session info.
    pub fn new() -> Self {
        Self {
            variables: Vec::new(),
            num_buf: 3,
            tick_rate: 60,
            session_capacity: 1024,
            buffer_capacity: None,
        }
    }

    /// Append a variable; offsets are assigned in declaration order.
    pub fn variable(mut self, name: &str, data_type: VariableType, count: usize) -> Self {
        self.variables.push((name.to_string(), data_type, count));
        self
    }

    /// Number of ring buffers declared in the header (1..=4).
    pub fn buffers(mut self, num_buf: usize) -> Self {
        self.num_buf = num_buf.clamp(1, crate::schema::MAX_BUFFERS);
        self
    }

    pub fn tick_rate(mut self, tick_rate: i32) -> Self {
        self.tick_rate = tick_rate;
        self
    }

    /// Bytes reserved for the session-info text, including the terminator.
    pub fn session_capacity(mut self, capacity: usize) -> Self {
        self.session_capacity = capacity.max(1);
        self
    }

    /// Reserve room so the declared buffer length can later grow to `capacity`.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = Some(capacity);
        self
    }

    /// Produce the image with the status bit set and every tick at zero.
    pub fn build(self) -> ProducerImage {
        let mut variables = Vec::with_capacity(self.variables.len());
        let mut cursor = 0usize;
        for (name, data_type, count) in self.variables {
            let offset = align_up(cursor, data_type.size());
            variables.push(VariableInfo {
                description: format!("{name} test channel"),
                units: String::new(),
                name,
                data_type,
                offset,
                count,
                count_as_time: false,
            });
            cursor = offset + data_type.size() * count;
        }

        let buf_len = align_up(cursor.max(1), BUFFER_ALIGN);
        let stride = align_up(self.buffer_capacity.unwrap_or(buf_len).max(buf_len), BUFFER_ALIGN);
        let var_header_offset = HEADER_SIZE;
        let session_info_offset = var_header_offset + variables.len() * VAR_HEADER_SIZE;
        let first_buffer = align_up(session_info_offset + self.session_capacity, BUFFER_ALIGN);
        let buffer_offsets: Vec<usize> = (0..self.num_buf).map(|i| first_buffer + i * stride).collect();
        let total = first_buffer + self.num_buf * stride;

        let mut bytes = vec![0u8; total];
        let mut put = |offset: usize, value: i32| {
            bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes())
        };
        put(0, IRSDK_VER);
        put(STATUS, STATUS_CONNECTED);
        put(TICK_RATE, self.tick_rate);
        put(SESSION_INFO_LEN, self.session_capacity as i32);
        put(SESSION_INFO_OFFSET, session_info_offset as i32);
        put(NUM_VARS, variables.len() as i32);
        put(VAR_HEADER_OFFSET, var_header_offset as i32);
        put(NUM_BUF, self.num_buf as i32);
        put(BUF_LEN, buf_len as i32);
        for (i, offset) in buffer_offsets.iter().enumerate() {
            put(VAR_BUF + i * VAR_BUF_STRIDE + 4, *offset as i32);
        }
        for (i, info) in variables.iter().enumerate() {
            let base = var_header_offset + i * VAR_HEADER_SIZE;
            bytes[base..base + VAR_HEADER_SIZE].copy_from_slice(&encode_var_header(info));
        }

        ProducerImage {
            bytes,
            variables,
            var_header_offset,
            session_info_offset,
            session_capacity: self.session_capacity,
            buf_len,
            buffer_offsets,
        }
    }
}

/// A built region image plus the layout facts tests need.
#[derive(Debug, Clone)]
pub struct ProducerImage {
    pub bytes: Vec<u8>,
    pub variables: Vec<VariableInfo>,
    pub var_header_offset: usize,
    pub session_info_offset: usize,
    pub session_capacity: usize,
    pub buf_len: usize,
    pub buffer_offsets: Vec<usize>,
}

impl ProducerImage {
    pub fn variable(&self, name: &str) -> Option<&VariableInfo> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// A zeroed buffer payload with the named values written in.
    ///
    /// # Panics
    ///
    /// Panics on unknown names; this is a test fixture.
    pub fn payload(&self, values: &[(&str, &[u8])]) -> Vec<u8> {
        let mut payload = vec![0u8; self.buf_len];
        for (name, value) in values {
            let info = self.variable(name).unwrap_or_else(|| panic!("unknown variable {name}"));
            payload[info.offset..info.offset + value.len()].copy_from_slice(value);
        }
        payload
    }
}

#[derive(Debug)]
struct Shared {
    bytes: Box<[AtomicU8]>,
    image: ProducerImage,
    running: AtomicBool,
    signal_available: AtomicBool,
    signaled: AtomicBool,
    tears: AtomicUsize,
    opens: AtomicUsize,
    next_buffer: AtomicUsize,
}

impl Shared {
    fn write(&self, offset: usize, data: &[u8]) {
        for (cell, byte) in self.bytes[offset..offset + data.len()].iter().zip(data) {
            cell.store(*byte, Ordering::Relaxed);
        }
    }

    fn read_i32(&self, offset: usize) -> i32 {
        let mut raw = [0u8; 4];
        for (byte, cell) in raw.iter_mut().zip(&self.bytes[offset..offset + 4]) {
            *byte = cell.load(Ordering::Relaxed);
        }
        i32::from_le_bytes(raw)
    }

    fn write_i32(&self, offset: usize, value: i32) {
        self.write(offset, &value.to_le_bytes());
    }

    /// Simulate the producer rewriting the buffer at `buf_offset` mid-copy.
    fn bump_tick_at(&self, buf_offset: usize) {
        if let Some(index) = self.image.buffer_offsets.iter().position(|o| *o == buf_offset) {
            let tick_offset = VAR_BUF + index * VAR_BUF_STRIDE;
            let tick = self.read_i32(tick_offset);
            self.write_i32(tick_offset, tick.wrapping_add(1));
        }
    }
}

/// Test double for the simulator process.
#[derive(Debug, Clone)]
pub struct MockProducer {
    shared: Arc<Shared>,
}

impl MockProducer {
    /// A running producer publishing `image`.
    pub fn new(image: ProducerImage) -> Self {
        let bytes = image.bytes.iter().map(|b| AtomicU8::new(*b)).collect();
        Self {
            shared: Arc::new(Shared {
                bytes,
                image,
                running: AtomicBool::new(true),
                signal_available: AtomicBool::new(true),
                signaled: AtomicBool::new(false),
                tears: AtomicUsize::new(0),
                opens: AtomicUsize::new(0),
                next_buffer: AtomicUsize::new(0),
            }),
        }
    }

    pub fn image(&self) -> &ProducerImage {
        &self.shared.image
    }

    pub fn memory(&self) -> MockSharedMemory {
        MockSharedMemory { shared: Arc::clone(&self.shared), open: false }
    }

    pub fn signal(&self) -> MockSignal {
        MockSignal { shared: Arc::clone(&self.shared), valid: false }
    }

    /// A reader wired to this producer.
    pub fn reader(&self) -> SessionReader<MockSharedMemory, MockSignal> {
        SessionReader::with_handles(ReaderConfig::default(), self.memory(), self.signal())
    }

    /// Whether the shared region can be opened.
    pub fn set_running(&self, running: bool) {
        self.shared.running.store(running, Ordering::SeqCst);
    }

    /// Whether the signal can be created.
    pub fn set_signal_available(&self, available: bool) {
        self.shared.signal_available.store(available, Ordering::SeqCst);
    }

    /// Number of successful region opens so far.
    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, connected: bool) {
        self.shared.write_i32(STATUS, if connected { STATUS_CONNECTED } else { 0 });
    }

    pub fn set_status(&self, status: i32) {
        self.shared.write_i32(STATUS, status);
    }

    pub fn set_num_buf(&self, num_buf: i32) {
        self.shared.write_i32(NUM_BUF, num_buf);
    }

    pub fn set_buf_len(&self, buf_len: i32) {
        self.shared.write_i32(BUF_LEN, buf_len);
    }

    pub fn set_buffer_offset(&self, index: usize, offset: i32) {
        self.shared.write_i32(VAR_BUF + index * VAR_BUF_STRIDE + 4, offset);
    }

    pub fn set_tick(&self, index: usize, tick: i32) {
        self.shared.write_i32(VAR_BUF + index * VAR_BUF_STRIDE, tick);
    }

    pub fn tick(&self, index: usize) -> i32 {
        self.shared.read_i32(VAR_BUF + index * VAR_BUF_STRIDE)
    }

    /// Write `payload` at the start of buffer `index`.
    pub fn write_buffer(&self, index: usize, payload: &[u8]) {
        self.shared.write(self.shared.image.buffer_offsets[index], payload);
    }

    /// Write a frame into the next buffer in rotation, stamp it and post the signal.
    pub fn publish(&self, tick: i32, payload: &[u8]) -> usize {
        let count = self.shared.image.buffer_offsets.len();
        let index = self.shared.next_buffer.fetch_add(1, Ordering::SeqCst) % count;
        self.write_buffer(index, payload);
        self.set_tick(index, tick);
        self.post();
        index
    }

    /// Post the data-valid signal.
    pub fn post(&self) {
        self.shared.signaled.store(true, Ordering::SeqCst);
    }

    /// Replace the session text and bump the update counter.
    pub fn set_session_info(&self, text: &str) {
        let capacity = self.shared.image.session_capacity;
        let mut blob = vec![0u8; capacity];
        let len = text.len().min(capacity - 1);
        blob[..len].copy_from_slice(&text.as_bytes()[..len]);
        self.shared.write(self.shared.image.session_info_offset, &blob);
        let counter = self.shared.read_i32(SESSION_INFO_UPDATE);
        self.shared.write_i32(SESSION_INFO_UPDATE, counter.wrapping_add(1));
    }

    pub fn set_session_info_update(&self, counter: i32) {
        self.shared.write_i32(SESSION_INFO_UPDATE, counter);
    }

    pub fn set_session_info_offset(&self, offset: i32) {
        self.shared.write_i32(SESSION_INFO_OFFSET, offset);
    }

    /// Make the next `count` buffer copies observe a producer write.
    pub fn tear_next_copies(&self, count: usize) {
        self.shared.tears.store(count, Ordering::SeqCst);
    }
}

/// [`SharedMemory`] handle onto a [`MockProducer`] image.
#[derive(Debug)]
pub struct MockSharedMemory {
    shared: Arc<Shared>,
    open: bool,
}

// SAFETY: the pointer comes from the `Arc`-owned byte slice this handle keeps
// alive; `AtomicU8` has the same layout as `u8`.
unsafe impl SharedMemory for MockSharedMemory {
    fn open(&mut self, _name: &str) -> Result<()> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return Err(TelemetryError::connection_failed("mock producer is not running"));
        }
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn as_ptr(&self) -> Option<NonNull<u8>> {
        if !self.open {
            return None;
        }
        NonNull::new(self.shared.bytes.as_ptr() as *mut u8)
    }

    fn len(&self) -> usize {
        if self.open { self.shared.bytes.len() } else { 0 }
    }

    fn copy_out(&self, offset: usize, dst: &mut [u8]) -> bool {
        let copied = self.region().is_some_and(|region| region.copy_to(offset, dst));
        let tear = self
            .shared
            .tears
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if copied && tear {
            self.shared.bump_tick_at(offset);
        }
        copied
    }
}

/// [`DataSignal`] handle onto a [`MockProducer`]. Never blocks.
#[derive(Debug)]
pub struct MockSignal {
    shared: Arc<Shared>,
    valid: bool,
}

impl DataSignal for MockSignal {
    fn create(&mut self, _name: &str) -> Result<()> {
        if !self.shared.signal_available.load(Ordering::SeqCst) {
            return Err(TelemetryError::connection_failed("mock signal unavailable"));
        }
        self.valid = true;
        Ok(())
    }

    fn close(&mut self) {
        self.valid = false;
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn wait(&mut self, _timeout: WaitTimeout) -> Result<WaitResult> {
        if !self.valid {
            return Err(TelemetryError::connection_failed("mock signal is closed"));
        }
        if self.shared.signaled.swap(false, Ordering::SeqCst) {
            Ok(WaitResult::Signaled)
        } else {
            Ok(WaitResult::Timeout)
        }
    }
}

/// Install a test tracing subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
