//! Repetition guard for browser operations
//!
//! A planner driven by an unreliable oracle can get stuck re-issuing the same
//! ineffective action. The guard keeps a bounded look-back of recent calls and
//! escalates identical consecutive calls: first a soft log, then a warning
//! returned in place of the real result, then a hard `RepeatedCall` failure.
//!
//! One look-back is shared by every guarded operation, so any other guarded
//! call in between ends a run of repeats.

use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{error, warn};

use crate::config::GuardSettings;
use crate::{PilotError, Result};

/// A recorded invocation
#[derive(Debug, Clone)]
struct CallRecord {
    name: String,
    args: Value,
    at: Instant,
}

/// What the guard decided for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
enum Admission {
    Proceed { repeat_count: usize },
    Warn { repeat_count: usize },
    Block { repeat_count: usize },
}

/// Result of a guarded call that was allowed to run
///
/// The warning variant still carries the real result so callers inside the
/// crate graph can tell the two apart; [`Guarded::into_output`] collapses it to
/// the warning text for callers that only see the output value.
#[derive(Debug, Clone, PartialEq)]
pub enum Guarded<T> {
    Passed(T),
    Warned { warning: String, suppressed: T },
}

impl<T> Guarded<T> {
    pub fn is_warning(&self) -> bool {
        matches!(self, Guarded::Warned { .. })
    }

    /// Output as seen by the planner: the warning replaces the real result
    pub fn into_output(self) -> T
    where
        T: From<String>,
    {
        match self {
            Guarded::Passed(value) => value,
            Guarded::Warned { warning, .. } => T::from(warning),
        }
    }
}

/// Detects and throttles identical consecutive invocations of guarded operations
#[derive(Debug)]
pub struct CallRepetitionGuard {
    history: Mutex<VecDeque<CallRecord>>,
    history_depth: usize,
    threshold: Duration,
    max_repeats: usize,
}

impl CallRepetitionGuard {
    /// Create a guard
    ///
    /// # Arguments
    ///
    /// * `history_depth` - Calls kept in the look-back buffer (oldest evicted first)
    /// * `threshold` - Calls older than this relative to the current one stop the scan
    /// * `max_repeats` - Repeat count at which calls are refused
    pub fn new(history_depth: usize, threshold: Duration, max_repeats: usize) -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(history_depth)),
            history_depth: history_depth.max(1),
            threshold,
            max_repeats: max_repeats.max(1),
        }
    }

    pub fn from_settings(settings: &GuardSettings) -> Self {
        Self::new(
            settings.history_depth,
            Duration::from_millis(settings.threshold_ms),
            settings.max_repeats,
        )
    }

    /// Run `op` under the guard
    ///
    /// `args` identifies the call together with `name`; two calls repeat each
    /// other only when both are equal.
    pub async fn invoke<T, F, Fut>(&self, name: &str, args: Value, op: F) -> Result<Guarded<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let admission = self.admit(name, args.clone(), Instant::now());

        match admission {
            Admission::Block { repeat_count } => {
                let message = self.warning_message(name, &args, repeat_count);
                error!("{}", message);
                Err(PilotError::RepeatedCall {
                    name: name.to_string(),
                    args: args.to_string(),
                })
            }
            Admission::Warn { repeat_count } => {
                let warning = self.warning_message(name, &args, repeat_count);
                warn!("{}", warning);
                let suppressed = op().await?;
                Ok(Guarded::Warned {
                    warning,
                    suppressed,
                })
            }
            Admission::Proceed { repeat_count } => {
                if repeat_count > 0 {
                    warn!(
                        "Repeated call to {} detected (call {} in a row)",
                        name,
                        repeat_count + 1
                    );
                }
                op().await.map(Guarded::Passed)
            }
        }
    }

    /// Number of calls currently held in the look-back buffer
    pub fn recorded_calls(&self) -> usize {
        self.lock().len()
    }

    /// Record the call and classify it against the preceding history
    fn admit(&self, name: &str, args: Value, at: Instant) -> Admission {
        let mut history = self.lock();

        let repeat_count = history
            .iter()
            .rev()
            .take_while(|prev| at.saturating_duration_since(prev.at) <= self.threshold)
            .take_while(|prev| prev.name == name && prev.args == args)
            .count();

        if history.len() == self.history_depth {
            history.pop_front();
        }
        history.push_back(CallRecord {
            name: name.to_string(),
            args,
            at,
        });

        if repeat_count >= self.max_repeats {
            Admission::Block { repeat_count }
        } else if repeat_count + 1 == self.max_repeats {
            Admission::Warn { repeat_count }
        } else {
            Admission::Proceed { repeat_count }
        }
    }

    fn warning_message(&self, name: &str, args: &Value, repeat_count: usize) -> String {
        format!(
            "{} was called {} times in a row within {}ms with arguments {}. \
             This action is probably not making progress; try a different approach.",
            name,
            repeat_count + 1,
            self.threshold.as_millis(),
            args
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<CallRecord>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CallRepetitionGuard {
    fn default() -> Self {
        Self::from_settings(&GuardSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn guard() -> CallRepetitionGuard {
        CallRepetitionGuard::new(15, Duration::from_millis(30_000), 3)
    }

    #[tokio::test]
    async fn test_four_identical_calls_escalate() {
        let guard = guard();
        let executed = AtomicUsize::new(0);
        let args = json!({"xpath": "//button"});

        let mut outcomes = Vec::new();
        for _ in 0..4 {
            let outcome = guard
                .invoke("click_element", args.clone(), || async {
                    executed.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, PilotError>(Value::from("clicked"))
                })
                .await;
            outcomes.push(outcome);
        }

        assert_eq!(outcomes[0].as_ref().unwrap(), &Guarded::Passed(json!("clicked")));
        assert_eq!(outcomes[1].as_ref().unwrap(), &Guarded::Passed(json!("clicked")));
        assert!(outcomes[2].as_ref().unwrap().is_warning());
        assert!(matches!(
            outcomes[3],
            Err(PilotError::RepeatedCall { ref name, .. }) if name == "click_element"
        ));

        // The warned call still ran; the blocked one did not
        assert_eq!(executed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_warning_replaces_output() {
        let guard = guard();
        let args = json!({"url": "https://example.com"});
        for _ in 0..2 {
            guard
                .invoke("go_to_url", args.clone(), || async { Ok::<_, PilotError>(json!("ok")) })
                .await
                .unwrap();
        }
        let third = guard
            .invoke("go_to_url", args, || async { Ok::<_, PilotError>(json!("ok")) })
            .await
            .unwrap();

        let output = third.into_output();
        let text = output.as_str().unwrap();
        assert!(text.contains("go_to_url"));
        assert!(text.contains("3 times"));
    }

    #[test]
    fn test_blocked_calls_keep_counting() {
        let guard = guard();
        let now = Instant::now();
        let args = json!({"xpath": "//a"});

        let decisions: Vec<_> = (0..6)
            .map(|i| guard.admit("click_element", args.clone(), now + Duration::from_millis(i)))
            .collect();

        assert_eq!(decisions[0], Admission::Proceed { repeat_count: 0 });
        assert_eq!(decisions[1], Admission::Proceed { repeat_count: 1 });
        assert_eq!(decisions[2], Admission::Warn { repeat_count: 2 });
        assert_eq!(decisions[3], Admission::Block { repeat_count: 3 });
        assert_eq!(decisions[4], Admission::Block { repeat_count: 4 });
        assert_eq!(decisions[5], Admission::Block { repeat_count: 5 });
        assert_eq!(guard.recorded_calls(), 6);
    }

    #[test]
    fn test_different_arguments_break_the_run() {
        let guard = guard();
        let now = Instant::now();

        guard.admit("click_element", json!({"xpath": "//a"}), now);
        guard.admit("click_element", json!({"xpath": "//a"}), now);
        guard.admit("click_element", json!({"xpath": "//b"}), now);
        let decision = guard.admit("click_element", json!({"xpath": "//a"}), now);

        assert_eq!(decision, Admission::Proceed { repeat_count: 0 });
    }

    #[test]
    fn test_different_names_break_the_run() {
        let guard = guard();
        let now = Instant::now();
        let args = json!({"url": "https://example.com"});

        guard.admit("go_to_url", args.clone(), now);
        guard.admit("open_tab", args.clone(), now);
        assert_eq!(
            guard.admit("go_to_url", args, now),
            Admission::Proceed { repeat_count: 0 }
        );
    }

    #[test]
    fn test_window_ages_out() {
        let guard = guard();
        let start = Instant::now();
        let args = json!({"xpath": "//a"});

        for i in 0..4 {
            guard.admit("click_element", args.clone(), start + Duration::from_millis(i));
        }

        let later = start + Duration::from_millis(31_000);
        assert_eq!(
            guard.admit("click_element", args, later),
            Admission::Proceed { repeat_count: 0 }
        );
    }

    #[test]
    fn test_buffer_is_bounded() {
        let guard = CallRepetitionGuard::new(4, Duration::from_secs(30), 3);
        let now = Instant::now();
        for i in 0..10 {
            guard.admit("scroll", json!(i), now);
        }
        assert_eq!(guard.recorded_calls(), 4);
    }

    #[tokio::test]
    async fn test_operation_errors_propagate() {
        let guard = guard();
        let result = guard
            .invoke("go_back", json!([]), || async {
                Err::<Value, _>(PilotError::Timeout("navigation".into()))
            })
            .await;
        assert!(matches!(result, Err(PilotError::Timeout(_))));
    }
}
