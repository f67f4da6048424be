//! Shared test utilities for datasource integration tests.
//!
//! - scripted collaborators (`MockDirectoryInteractor`, `ManualWatcher`) so
//!   folder sources can be driven without touching the file system
//! - `Recorder` for capturing change events

#![allow(dead_code)]

pub mod mocks;
pub mod recorder;

pub use mocks::*;
pub use recorder::Recorder;
