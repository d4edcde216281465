//! Completion checks and the end-of-run summary

use crate::prompt::{build_completion_prompt, build_summary_prompt};
use pilot_agent::{Oracle, Verdict};
use pilot_core::{EnvironmentSnapshot, HistoryRecord, Task};
use std::sync::Arc;
use tracing::{debug, warn};

/// Summary used when nothing was executed
pub const EMPTY_RUN_SUMMARY: &str = "Task finished";
/// Summary used when the oracle could not produce one
pub const SUMMARY_FALLBACK: &str = "Task finished, but a detailed summary could not be generated";

/// History records included in the summary request
const SUMMARY_WINDOW: usize = 5;

pub struct CompletionObserver<O> {
    oracle: Arc<O>,
}

impl<O: Oracle> CompletionObserver<O> {
    pub fn new(oracle: Arc<O>) -> Self {
        Self { oracle }
    }

    /// Ask the oracle whether `task` is done
    ///
    /// With nothing executed yet there is nothing to judge, and an oracle
    /// failure is not evidence either way; both yield `Undetermined`.
    pub async fn is_task_complete(
        &self,
        task: &Task,
        history: &[HistoryRecord],
        snapshot: &EnvironmentSnapshot,
    ) -> Verdict {
        if history.is_empty() {
            return Verdict::Undetermined;
        }

        let prompt = build_completion_prompt(task, history, snapshot);
        match self.oracle.complete(&prompt).await {
            Ok(answer) => {
                let verdict = Verdict::parse(&answer);
                debug!("Completion answer {:?} -> {:?}", answer.trim(), verdict);
                verdict
            }
            Err(e) => {
                warn!("Completion check failed: {}", e);
                Verdict::Undetermined
            }
        }
    }

    /// Short natural-language report of the run
    pub async fn summarize(&self, task: &Task, history: &[HistoryRecord]) -> String {
        if history.is_empty() {
            return EMPTY_RUN_SUMMARY.to_string();
        }

        let recent = &history[history.len().saturating_sub(SUMMARY_WINDOW)..];
        let prompt = build_summary_prompt(task, recent);
        match self.oracle.complete(&prompt).await {
            Ok(summary) if !summary.trim().is_empty() => summary.trim().to_string(),
            Ok(_) => SUMMARY_FALLBACK.to_string(),
            Err(e) => {
                warn!("Summary generation failed: {}", e);
                SUMMARY_FALLBACK.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_agent::ScriptedOracle;
    use pilot_core::{OperationResult, PilotError, PlannedAction};

    fn history(n: usize) -> Vec<HistoryRecord> {
        (0..n)
            .map(|i| HistoryRecord {
                operation: PlannedAction::idle_scroll(i as i64),
                result: OperationResult::success("scrolled"),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_empty_history_skips_the_oracle() {
        let oracle = Arc::new(ScriptedOracle::new().with_fallback("yes"));
        let observer = CompletionObserver::new(Arc::clone(&oracle));

        let verdict = observer
            .is_task_complete(&Task::new("t"), &[], &EnvironmentSnapshot::default())
            .await;

        assert_eq!(verdict, Verdict::Undetermined);
        assert_eq!(oracle.call_count(), 0);
        assert_eq!(observer.summarize(&Task::new("t"), &[]).await, EMPTY_RUN_SUMMARY);
    }

    #[tokio::test]
    async fn test_affirmative_answer() {
        let oracle = Arc::new(ScriptedOracle::with_responses(["Yes, the form was saved."]));
        let observer = CompletionObserver::new(oracle);

        let verdict = observer
            .is_task_complete(&Task::new("t"), &history(1), &EnvironmentSnapshot::default())
            .await;

        assert!(verdict.is_complete());
    }

    #[tokio::test]
    async fn test_hedged_denial_is_not_complete() {
        let oracle = Arc::new(ScriptedOracle::with_responses(["The task is not yet complete."]));
        let observer = CompletionObserver::new(oracle);

        let verdict = observer
            .is_task_complete(&Task::new("t"), &history(1), &EnvironmentSnapshot::default())
            .await;

        assert_eq!(verdict, Verdict::Incomplete);
    }

    #[tokio::test]
    async fn test_oracle_failure_is_undetermined() {
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.push_error(PilotError::Timeout("slow".to_string()));
        let observer = CompletionObserver::new(oracle);

        let verdict = observer
            .is_task_complete(&Task::new("t"), &history(2), &EnvironmentSnapshot::default())
            .await;

        assert_eq!(verdict, Verdict::Undetermined);
    }

    #[tokio::test]
    async fn test_summary_uses_recent_history() {
        let oracle = Arc::new(ScriptedOracle::with_responses(["  Scrolled the page eight times.\n"]));
        let observer = CompletionObserver::new(Arc::clone(&oracle));

        let summary = observer.summarize(&Task::new("t"), &history(8)).await;

        assert_eq!(summary, "Scrolled the page eight times.");
        let prompt = &oracle.prompts()[0];
        assert!(prompt.contains("pixel: 7"));
        assert!(!prompt.contains("pixel: 2"));
    }

    #[tokio::test]
    async fn test_summary_fallback() {
        let oracle = Arc::new(ScriptedOracle::new());
        let observer = CompletionObserver::new(oracle);

        let summary = observer.summarize(&Task::new("t"), &history(1)).await;

        assert_eq!(summary, SUMMARY_FALLBACK);
    }
}
