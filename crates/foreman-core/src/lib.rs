//! # Foreman Core
//!
//! Runtime pieces shared by the foreman server and client: the signal
//! router with its three dispositions, the periodic task with its staged
//! stop ladder, the monotonic job counters, and small reporting helpers.
//!
//! Nothing in this crate knows about queues or the wire; it is the layer
//! both sides stand on so that shutdown behaves the same everywhere.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod counters;
pub mod periodic;
pub mod report;
pub mod signal;

pub use counters::{CounterSnapshot, Counters};
pub use periodic::{LastResort, PeriodicTask, PeriodicTaskBuilder, SignalMode, TaskError};
pub use report::{filename_timestamp, humanize_speed, humanize_time, local_hostname};
pub use signal::{Disposition, SignalRouter, StopFlag, StopListener};
