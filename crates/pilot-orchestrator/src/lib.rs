//! Control loop for the Pilot browser agent
//!
//! One run cycles PERCEIVE -> PLAN -> EXECUTE -> OBSERVE:
//!
//! - [`SnapshotProducer`](pilot_browser::SnapshotProducer) captures the browser
//! - [`Planner`] asks the oracle for one action, degrading to an idle scroll
//! - [`Executor`] validates and dispatches it, returning a structured result
//! - [`CompletionObserver`] asks whether the task is done
//!
//! [`FlowController`] sequences the steps through the pure state machine in
//! [`state_machine`] and enforces retry, failure and iteration limits.

mod activity_logger;
mod executor;
mod flow;
mod observer;
pub mod plan;
mod planner;
pub mod prompt;
mod run_state;
pub mod state_machine;

pub use activity_logger::ActivityLogger;
pub use executor::Executor;
pub use flow::{FlowController, RunOutcome};
pub use observer::{CompletionObserver, EMPTY_RUN_SUMMARY, SUMMARY_FALLBACK};
pub use plan::parse_plan;
pub use planner::Planner;
pub use prompt::PlanContext;
pub use run_state::RunState;
pub use state_machine::{ExecRoute, StopReason};
