//! Mutable state carried across one run

use crate::prompt::PlanContext;
use crate::state_machine::{route_execution, ExecRoute};
use pilot_core::{
    EnvironmentSnapshot, HistoryRecord, OperationResult, PlannedAction, RunSettings, Task,
};
use uuid::Uuid;

/// Everything the control loop knows about a run in progress
///
/// Owned by a single flow controller and never shared between runs.
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: Uuid,
    pub task: Task,
    /// Latest perception; replaced wholesale every cycle
    pub snapshot: EnvironmentSnapshot,
    pub last_operation: Option<PlannedAction>,
    pub last_result: Option<OperationResult>,
    /// Terminal outcomes only; transient failures that get retried are not recorded
    pub history: Vec<HistoryRecord>,
    /// Consecutive failed executions, reset on success
    pub retry_count: u32,
    pub last_failed_operation: Option<PlannedAction>,
    /// Completed cycles
    pub iteration: usize,
    pub final_message: Option<String>,
}

impl RunState {
    pub fn new(task: Task) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            task,
            snapshot: EnvironmentSnapshot::default(),
            last_operation: None,
            last_result: None,
            history: Vec::new(),
            retry_count: 0,
            last_failed_operation: None,
            iteration: 0,
            final_message: None,
        }
    }

    /// The most recent `window` history records, oldest first
    pub fn history_suffix(&self, window: usize) -> &[HistoryRecord] {
        let start = self.history.len().saturating_sub(window);
        &self.history[start..]
    }

    pub fn plan_context(&self, window: usize) -> PlanContext<'_> {
        PlanContext {
            task: &self.task,
            snapshot: &self.snapshot,
            last_operation: self.last_operation.as_ref(),
            last_result: self.last_result.as_ref(),
            history: self.history_suffix(window),
            last_failed_operation: self.last_failed_operation.as_ref(),
            retry_count: self.retry_count,
        }
    }

    /// Record one execution outcome and decide where control goes next
    ///
    /// A failure bumps `retry_count` before routing, so the first transient
    /// failure is attempt 1 of the retry budget.
    pub fn record_outcome(
        &mut self,
        operation: &PlannedAction,
        result: OperationResult,
        limits: &RunSettings,
    ) -> ExecRoute {
        let route = if result.is_error() {
            self.retry_count += 1;
            self.last_failed_operation = Some(operation.clone());
            route_execution(result.error_type(), self.retry_count, limits)
        } else {
            self.retry_count = 0;
            self.last_failed_operation = None;
            ExecRoute::Success
        };

        if route != ExecRoute::Retry {
            self.history.push(HistoryRecord {
                operation: operation.clone(),
                result: result.clone(),
            });
        }
        self.last_result = Some(result);
        route
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_core::{ActionKind, Params};

    fn timeout() -> OperationResult {
        OperationResult::failure("TimeoutError", "slow", Some("go_back"), Params::new())
    }

    #[test]
    fn test_transient_failures_retry_then_replan() {
        let mut run = RunState::new(Task::new("t"));
        let op = PlannedAction::new(ActionKind::GoBack, Params::new());
        let limits = RunSettings::default();

        for expected in 1..=3 {
            assert_eq!(run.record_outcome(&op, timeout(), &limits), ExecRoute::Retry);
            assert_eq!(run.retry_count, expected);
        }
        assert!(run.history.is_empty());

        assert_eq!(run.record_outcome(&op, timeout(), &limits), ExecRoute::Replan);
        assert_eq!(run.history.len(), 1);
        assert_eq!(run.last_failed_operation.as_ref(), Some(&op));

        assert_eq!(
            run.record_outcome(&op, OperationResult::success("back"), &limits),
            ExecRoute::Success
        );
        assert_eq!(run.retry_count, 0);
        assert!(run.last_failed_operation.is_none());
        assert_eq!(run.history.len(), 2);
    }

    #[test]
    fn test_history_suffix_window() {
        let mut run = RunState::new(Task::new("t"));
        let limits = RunSettings::default();
        for pixel in 0..8 {
            let op = PlannedAction::idle_scroll(pixel);
            run.record_outcome(&op, OperationResult::success("ok"), &limits);
        }

        let suffix = run.history_suffix(5);
        assert_eq!(suffix.len(), 5);
        assert_eq!(suffix[0].operation, PlannedAction::idle_scroll(3));
        assert_eq!(run.history_suffix(20).len(), 8);
        assert_eq!(run.plan_context(5).history.len(), 5);
    }
}
