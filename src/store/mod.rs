//! Persistence for triggers, results, and idempotence keys.

pub mod trigger_store;

pub use trigger_store::TriggerStore;
