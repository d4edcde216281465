//! Flow controller - drives one run of the perceive/plan/act/observe loop
//!
//! The controller owns the [`RunState`] and performs the I/O; every routing
//! decision goes through the pure [`transition`] function. Termination is
//! guaranteed: every cycle increments the iteration count up to the cap,
//! transient retries are budgeted, and consecutive failures outside a cycle
//! are bounded by `max_consecutive_failures`.

use crate::activity_logger::ActivityLogger;
use crate::executor::Executor;
use crate::observer::CompletionObserver;
use crate::planner::Planner;
use crate::run_state::RunState;
use crate::state_machine::{
    decide_after_observation, transition, Action, Event, State, StopReason,
};
use pilot_agent::Oracle;
use pilot_browser::{BrowserDriver, SnapshotProducer};
use pilot_core::{
    EnvironmentSnapshot, HistoryRecord, PilotConfig, PilotError, Result, RetryPolicy,
    RunSettings, Task,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    /// Completed cycles
    pub iterations: usize,
    pub stop_reason: StopReason,
    pub final_message: String,
    pub summary: String,
    pub history: Vec<HistoryRecord>,
}

impl RunOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self.stop_reason, StopReason::TaskComplete { .. })
    }
}

/// Runs tasks against one oracle and one browser driver
pub struct FlowController<O, D> {
    planner: Planner<O, D>,
    executor: Executor<D>,
    observer: CompletionObserver<O>,
    snapshots: SnapshotProducer<D>,
    perception: RetryPolicy,
    limits: RunSettings,
    activity_logger: Option<ActivityLogger>,
}

impl<O: Oracle, D: BrowserDriver> FlowController<O, D> {
    pub fn new(oracle: Arc<O>, driver: Arc<D>, config: &PilotConfig) -> Self {
        let settle = Duration::from_millis(config.browser.highlight_settle_ms);
        Self {
            planner: Planner::new(Arc::clone(&oracle), Arc::clone(&driver), &config.planner),
            executor: Executor::new(Arc::clone(&driver)),
            observer: CompletionObserver::new(oracle),
            snapshots: SnapshotProducer::new(driver, settle),
            perception: RetryPolicy::new(
                config.planner.max_attempts,
                Duration::from_millis(config.planner.backoff_ms),
            ),
            limits: config.run.clone(),
            activity_logger: None,
        }
    }

    /// Enable activity logging to `<dir>/activity.md`
    pub fn with_activity_logging(mut self, dir: PathBuf) -> Self {
        self.activity_logger = Some(ActivityLogger::new(dir));
        self
    }

    /// Run `task` until it is judged complete or a limit stops it
    ///
    /// Returns an error only when the environment cannot be observed at all
    /// (or on an internal routing fault). Every other failure is fed back to
    /// the planner.
    pub async fn run(&self, task: Task) -> Result<RunOutcome> {
        let mut run = RunState::new(task);
        let max_iterations = self.limits.max_iterations;
        info!("Starting run {} for task: {}", run.run_id, run.task.headline());

        if let Some(logger) = &self.activity_logger {
            logger
                .log_run_start(&run.run_id, run.task.as_str(), max_iterations)
                .await;
        }

        let mut state = State::Perceive;
        let mut cycle_start = 0;
        let mut summary = None;
        let mut perception_error = None;

        loop {
            let event = match &state {
                State::Perceive => {
                    cycle_start = run.history.len();
                    match self.perceive().await {
                        Ok(snapshot) => {
                            run.snapshot = snapshot;
                            Event::Perceived
                        }
                        Err(e) => {
                            let error = e.to_string();
                            perception_error = Some(e);
                            Event::PerceptionFailed { error }
                        }
                    }
                }

                State::Plan => {
                    let planned = self
                        .planner
                        .plan(&run.plan_context(self.limits.history_window))
                        .await;
                    run.last_operation = Some(planned);
                    Event::Planned
                }

                State::Execute => {
                    let Some(planned) = run.last_operation.clone() else {
                        return Err(PilotError::Other(
                            "execute reached without a planned action".to_string(),
                        ));
                    };
                    let result = self.executor.execute(&planned).await;
                    debug!("{} -> {}", planned.action, result.describe());
                    let route = run.record_outcome(&planned, result, &self.limits);
                    Event::Executed { route }
                }

                State::Observe => {
                    run.iteration += 1;
                    let verdict = self
                        .observer
                        .is_task_complete(
                            &run.task,
                            run.history_suffix(self.limits.history_window),
                            &run.snapshot,
                        )
                        .await;
                    info!(
                        "=== Iteration {} of {}: {:?} ===",
                        run.iteration, max_iterations, verdict
                    );

                    if let Some(logger) = &self.activity_logger {
                        logger
                            .log_iteration_complete(
                                run.iteration,
                                max_iterations,
                                &run.history[cycle_start..],
                                &verdict,
                            )
                            .await;
                    }

                    Event::Observed {
                        decision: decide_after_observation(&verdict, run.iteration, max_iterations),
                    }
                }

                State::Done { .. } | State::Failed { .. } => break,
            };

            let (next, actions) = transition(state, event);
            for action in actions {
                match action {
                    Action::LogActivity { message } => {
                        info!("{}", message);
                        if let Some(logger) = &self.activity_logger {
                            logger.log_note(&message).await;
                        }
                    }
                    Action::PauseBeforeRetry => {
                        debug!(
                            "Transient failure, retrying ({}/{})",
                            run.retry_count, self.limits.max_transient_retries
                        );
                        let pause = self.limits.retry_pause();
                        if !pause.is_zero() {
                            tokio::time::sleep(pause).await;
                        }
                    }
                    Action::Summarize => {
                        summary = Some(self.observer.summarize(&run.task, &run.history).await);
                    }
                }
            }
            state = next;
        }

        let stop_reason = match state {
            State::Done { stop } => stop,
            State::Failed { error } => {
                warn!("Run {} aborted: {}", run.run_id, error);
                if let Some(logger) = &self.activity_logger {
                    logger
                        .log_run_complete(run.iteration, false, "aborted", &error)
                        .await;
                }
                return Err(perception_error.unwrap_or(PilotError::Other(error)));
            }
            _ => return Err(PilotError::Other("run loop exited early".to_string())),
        };

        let final_message = match &stop_reason {
            StopReason::TaskComplete { verdict } => format!("Task complete: {}", verdict.trim()),
            StopReason::MaxIterations => {
                format!("Max iterations reached ({}); task ended", max_iterations)
            }
            StopReason::TooManyFailures => format!(
                "Too many consecutive failures ({}); task ended",
                run.retry_count
            ),
        };
        run.final_message = Some(final_message.clone());
        let summary = match summary {
            Some(summary) => summary,
            None => self.observer.summarize(&run.task, &run.history).await,
        };

        info!("Run {} finished: {}", run.run_id, final_message);
        if let Some(logger) = &self.activity_logger {
            logger
                .log_run_complete(
                    run.iteration,
                    matches!(stop_reason, StopReason::TaskComplete { .. }),
                    &final_message,
                    &summary,
                )
                .await;
        }

        Ok(RunOutcome {
            run_id: run.run_id,
            iterations: run.iteration,
            stop_reason,
            final_message,
            summary,
            history: run.history,
        })
    }

    async fn perceive(&self) -> Result<EnvironmentSnapshot> {
        self.perception
            .run("perceive", |_| self.snapshots.snapshot())
            .await
    }
}
