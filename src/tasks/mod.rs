//! Background Tasks Module
//!
//! Contains work that runs beside request handling.
//!
//! # Tasks
//! - Signal pipeline: applies access events to the admission policy

mod signals;

pub use signals::{spawn_signal_task, Signal, SignalSender};
