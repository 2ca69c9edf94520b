//! Periodic capture scheduler.
//!
//! Each tick asks the host for its UI tree, searches it for the configured
//! target and clicks the first match. Cadence, tick bookkeeping and the
//! `Idle → Running → Stopped` lifecycle live here.

pub mod config;
pub mod outcome;
pub mod runner;

pub use config::{CadencePolicy, ScheduleConfig};
pub use outcome::{OutcomeCounters, TickOutcome, TickRecord};
pub use runner::{CaptureScheduler, SchedulerHandle, SchedulerSnapshot, SchedulerStatus};
