//! Cross-platform reader for a racing simulator's live shared-memory telemetry.
//!
//! The simulator publishes a fixed header, a table of variable descriptors,
//! a session-info text blob and a small ring of telemetry buffers through a
//! named memory map, and flags each new tick through a named "data valid"
//! signal. This crate maps both objects read-only and turns the rotating
//! buffers into tick-consistent snapshots.
//!
//! # Features
//!
//! - **Synchronous polling**: [`SessionReader`] for hosts with their own loop
//! - **Async monitoring**: [`TelemetryMonitor`] drives a reader on tokio and emits events
//! - **Type safety**: typed value extraction through [`VarData`]
//! - **Cross-platform**: Windows file mappings and events, POSIX `shm_open` and named semaphores
//! - **Remote control**: broadcast commands to the simulator UI on Windows
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use irsdk_shm::{MonitorConfig, MonitorEvent, SessionReader, TelemetryMonitor};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let monitor = TelemetryMonitor::spawn(SessionReader::native(), MonitorConfig::default());
//!     let mut events = monitor.subscribe();
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             MonitorEvent::Connected => println!("simulator connected"),
//!             MonitorEvent::Telemetry(frame) => println!("tick {}", frame.tick),
//!             MonitorEvent::Disconnected => break,
//!             _ => {}
//!         }
//!     }
//! }
//! ```

pub mod broadcast;
pub mod config;
mod error;
pub mod monitor;
pub mod platform;
pub mod reader;
pub mod schema;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use config::{MonitorConfig, ReaderConfig};
pub use monitor::{MonitorEvent, TelemetryMonitor};
pub use reader::SessionReader;
