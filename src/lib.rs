//! capture-pilot: a periodic, self-resuming UI-automation capture loop.
//!
//! A background scheduler repeatedly asks the host for its current UI tree,
//! searches it for a target element by exact label/description match and
//! clicks the first hit. Missing trees, missing targets and failed clicks
//! are expected and never stop the loop.
//!
//! # Architecture
//!
//! - **Tree matching** ([`tree`]): bounded depth-first search over a read-only snapshot
//! - **Dispatch** ([`dispatch`]): precondition-checked single synthetic click
//! - **Scheduling** ([`scheduler`]): `Idle → Running → Stopped` tick loop on tokio
//! - **Lifecycle** ([`lifecycle`]): start/stop coordinated with host keep-alive
//!
//! Hosts plug in through three traits: [`TreeProvider`], [`ActionChannel`]
//! and [`KeepAliveService`]. File-backed adapters in [`provider`] and
//! [`keepalive`] run the loop headless.

pub mod app_dirs;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod keepalive;
pub mod lifecycle;
pub mod provider;
pub mod scheduler;
pub mod tree;

pub use config::CaptureConfig;
pub use dispatch::{ActionChannel, ActionDispatcher, DispatchError};
pub use error::{CaptureError, Result};
pub use keepalive::{KeepAliveService, KeepAliveToken};
pub use lifecycle::LifecycleGuard;
pub use provider::{ProviderError, TreeProvider};
pub use scheduler::{
    CaptureScheduler, SchedulerHandle, SchedulerSnapshot, SchedulerStatus, TickOutcome,
};
pub use tree::{MatchCriterion, MatchField, TreeMatcher, UiNode};
