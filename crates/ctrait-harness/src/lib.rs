#![forbid(unsafe_code)]

//! Test harness and reference fixtures for the ctrait engine.
//!
//! - [`recorder`]: notifiers that record every change they see.
//! - [`fixtures`]: ready-made descriptors, classes, and contexts.
//! - [`capture`]: a `tracing` layer that keeps engine events for assertions.

pub mod capture;
pub mod fixtures;
pub mod recorder;

pub use capture::{CapturedEvent, EventCapture};
pub use recorder::{ChangeRecorder, RecordedChange};
