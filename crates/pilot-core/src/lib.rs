//! # pilot-core
//!
//! Core types for the Pilot browser agent.
//!
//! Pilot drives a goal-directed loop: observe the browser, ask a reasoning
//! oracle for the next action, execute it, and judge whether the goal is met.
//! This crate holds what every stage shares:
//!
//! - The data model (tasks, snapshots, planned actions, operation results)
//! - The unified [`PilotError`] type
//! - Configuration loaded from `.pilot/config.toml`
//! - The [`CallRepetitionGuard`] that turns silent action loops into errors
//! - The bounded-retry policy used wherever an unreliable call may degrade

pub mod config;
pub mod degrade;
mod error;
pub mod guard;
mod types;

pub use config::{
    BrowserSettings, GuardSettings, OracleSettings, PilotConfig, PlannerSettings, RunSettings,
};
pub use degrade::{fail_open, RetryPolicy};
pub use error::{is_transient_error_type, PilotError, Result, TRANSIENT_ERROR_TYPES};
pub use guard::{CallRepetitionGuard, Guarded};
pub use types::*;
