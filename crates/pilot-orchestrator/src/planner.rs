//! Planner: asks the oracle for the next action
//!
//! Each planning step makes a bounded number of oracle attempts. When none of
//! them yields a usable plan the step degrades to an idle scroll, so the loop
//! always has something safe to execute.

use crate::plan::parse_plan;
use crate::prompt::{build_plan_prompt, PlanContext};
use pilot_agent::Oracle;
use pilot_browser::{normalize_xpath, relax_exact_match, BrowserDriver};
use pilot_core::{PlannedAction, PlannerSettings, RetryPolicy};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct Planner<O, D> {
    oracle: Arc<O>,
    driver: Arc<D>,
    policy: RetryPolicy,
    fallback_scroll_px: i64,
}

impl<O: Oracle, D: BrowserDriver> Planner<O, D> {
    pub fn new(oracle: Arc<O>, driver: Arc<D>, settings: &PlannerSettings) -> Self {
        Self {
            oracle,
            driver,
            policy: RetryPolicy::new(
                settings.max_attempts,
                Duration::from_millis(settings.backoff_ms),
            ),
            fallback_scroll_px: settings.fallback_scroll_px,
        }
    }

    /// Produce the next action; never fails
    pub async fn plan(&self, ctx: &PlanContext<'_>) -> PlannedAction {
        let prompt = build_plan_prompt(ctx);

        let planned = self
            .policy
            .run_or_else(
                "planner",
                |attempt| {
                    let prompt = &prompt;
                    async move {
                        debug!("Planning attempt {}", attempt);
                        let raw = self.oracle.complete(prompt).await?;
                        parse_plan(&raw)
                    }
                },
                || {
                    warn!(
                        "No usable plan, falling back to scroll_down({})",
                        self.fallback_scroll_px
                    );
                    PlannedAction::idle_scroll(self.fallback_scroll_px)
                },
            )
            .await;

        let planned = self.refine_locator(planned).await;
        info!("Planned {} {}", planned.action, serde_json::Value::Object(planned.params.clone()));
        planned
    }

    /// Swap an exact-text XPath that matches nothing for its relaxed form
    ///
    /// The relaxed locator is only used when it resolves to exactly one
    /// element. Any trouble counting leaves the action untouched.
    async fn refine_locator(&self, mut planned: PlannedAction) -> PlannedAction {
        if !planned.action.takes_locator() {
            return planned;
        }
        let Some(xpath) = planned.param_str("xpath").map(normalize_xpath) else {
            return planned;
        };

        match self.driver.count_matches(&xpath).await {
            Ok(0) => {}
            Ok(_) => return planned,
            Err(e) => {
                debug!("Could not check locator {}: {}", xpath, e);
                return planned;
            }
        }

        let Some(relaxed) = relax_exact_match(&xpath) else {
            return planned;
        };
        match self.driver.count_matches(&relaxed).await {
            Ok(1) => {
                info!("Locator {} matched nothing, using {}", xpath, relaxed);
                planned
                    .params
                    .insert("xpath".to_string(), Value::String(relaxed));
            }
            Ok(n) => debug!("Relaxed locator {} matched {} elements, keeping original", relaxed, n),
            Err(e) => debug!("Could not check relaxed locator {}: {}", relaxed, e),
        }
        planned
    }
}
