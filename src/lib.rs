//! Remindr - a local task and notification scheduling engine
//!
//! Remindr holds a set of triggers (one-shot times, weekly rules,
//! calendar-event offsets, daily check-ins, manual invocations), decides when
//! each is due, dispatches the work to an agent runner, and turns outcomes
//! into actionable notifications supporting respond/snooze/dismiss.

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod id;
pub mod meetings;
pub mod notify;
pub mod projection;
pub mod recurrence;
pub mod runner;
pub mod scheduler;
pub mod store;

pub use error::{RemindrError, Result};
