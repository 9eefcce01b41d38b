//! Trigger scheduling: the core state machine and the async service loop.

pub mod core;
pub mod service;

pub use self::core::{ArmState, CorePolicy, SchedulerCore};
pub use self::service::{SchedulerCommand, SchedulerHandle, SchedulerService, ServiceConfig};
