//! Pure state machine for the agent control loop
//!
//! One cycle is PERCEIVE -> PLAN -> EXECUTE -> OBSERVE. EXECUTE may loop on
//! itself (transient failure retry) or fall back to PLAN (re-plan after a
//! failure) before a cycle completes.
//!
//! - Pure function: transition(state, event) -> (state, actions)
//! - No async and no I/O; the flow controller performs the actions
//! - Invalid transitions go to Failed (never panic)

use pilot_agent::Verdict;
use pilot_core::{is_transient_error_type, RunSettings};
use serde::{Deserialize, Serialize};

/// Why a run ended normally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// The oracle affirmed completion
    TaskComplete { verdict: String },
    /// The iteration cap was reached
    MaxIterations,
    /// Executions kept failing without a success in between
    TooManyFailures,
}

/// Control loop state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Perceive,
    Plan,
    Execute,
    Observe,
    /// Finished normally
    Done { stop: StopReason },
    /// Aborted; the run returns an error
    Failed { error: String },
}

/// Where control goes after an execution outcome has been recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecRoute {
    /// Success: observe the result
    Success,
    /// Transient failure within budget: run the same action again
    Retry,
    /// Failure: ask the planner for a new action
    Replan,
    /// Too many consecutive failures: abandon the run
    GiveUp,
}

/// Outcome of the completion check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserveDecision {
    Continue,
    Finish(StopReason),
}

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A fresh snapshot was captured
    Perceived,
    /// The environment could not be observed, retries included
    PerceptionFailed { error: String },
    /// The planner produced an action
    Planned,
    /// The executor finished an attempt
    Executed { route: ExecRoute },
    /// The completion check finished
    Observed { decision: ObserveDecision },
}

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    LogActivity { message: String },
    /// Sleep for the retry pause before executing again
    PauseBeforeRetry,
    /// Produce the end-of-run summary
    Summarize,
}

/// Route an execution outcome
///
/// `retry_count` is the consecutive failure count including this outcome.
/// A success is `error_type == None`.
pub fn route_execution(error_type: Option<&str>, retry_count: u32, limits: &RunSettings) -> ExecRoute {
    let Some(error_type) = error_type else {
        return ExecRoute::Success;
    };
    if retry_count > limits.max_consecutive_failures {
        ExecRoute::GiveUp
    } else if is_transient_error_type(error_type) && retry_count <= limits.max_transient_retries {
        ExecRoute::Retry
    } else {
        ExecRoute::Replan
    }
}

/// Decide whether the run stops after `iteration` completed cycles
pub fn decide_after_observation(
    verdict: &Verdict,
    iteration: usize,
    max_iterations: usize,
) -> ObserveDecision {
    match verdict {
        Verdict::Complete { answer } => ObserveDecision::Finish(StopReason::TaskComplete {
            verdict: answer.clone(),
        }),
        _ if iteration >= max_iterations => ObserveDecision::Finish(StopReason::MaxIterations),
        _ => ObserveDecision::Continue,
    }
}

/// Pure state transition function
///
/// Takes the current state and an event, returns the new state and the
/// actions to perform. Never panics; invalid transitions yield Failed.
pub fn transition(state: State, event: Event) -> (State, Vec<Action>) {
    match (state, event) {
        (State::Perceive, Event::Perceived) => (State::Plan, vec![]),

        (State::Perceive, Event::PerceptionFailed { error }) => {
            let actions = vec![Action::LogActivity {
                message: format!("Environment unavailable: {}", error),
            }];
            (State::Failed { error }, actions)
        }

        (State::Plan, Event::Planned) => (State::Execute, vec![]),

        (State::Execute, Event::Executed { route }) => match route {
            ExecRoute::Success => (State::Observe, vec![]),
            ExecRoute::Retry => (State::Execute, vec![Action::PauseBeforeRetry]),
            ExecRoute::Replan => (
                State::Plan,
                vec![Action::LogActivity {
                    message: "Operation failed, re-planning".to_string(),
                }],
            ),
            ExecRoute::GiveUp => (
                State::Done {
                    stop: StopReason::TooManyFailures,
                },
                vec![
                    Action::LogActivity {
                        message: "Too many consecutive failures, giving up".to_string(),
                    },
                    Action::Summarize,
                ],
            ),
        },

        (State::Observe, Event::Observed { decision }) => match decision {
            ObserveDecision::Continue => (State::Perceive, vec![]),
            ObserveDecision::Finish(stop) => (State::Done { stop }, vec![Action::Summarize]),
        },

        (State::Done { stop }, event) => (
            State::Failed {
                error: format!(
                    "Invalid transition from Done state ({:?}) on event: {:?}",
                    stop, event
                ),
            },
            vec![],
        ),

        (State::Failed { error }, event) => (
            State::Failed {
                error: format!(
                    "Invalid transition from Failed state (error: {}) on event: {:?}",
                    error, event
                ),
            },
            vec![],
        ),

        (state, event) => (
            State::Failed {
                error: format!(
                    "Invalid state transition: {:?} cannot handle event {:?}",
                    state, event
                ),
            },
            vec![],
        ),
    }
}
