//! Prompt builders for the planning, completion and summary questions
//!
//! All three share the same layout: Markdown sections with the structured
//! parts (environment, history) rendered as YAML so the oracle sees the same
//! format it is asked to answer in.

use pilot_core::{
    is_transient_error_type, ActionKind, EnvironmentSnapshot, HistoryRecord, OperationFailure,
    OperationResult, PlannedAction, Task,
};
use serde::Serialize;

/// Everything the planner gets to see for one planning step
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    pub task: &'a Task,
    pub snapshot: &'a EnvironmentSnapshot,
    pub last_operation: Option<&'a PlannedAction>,
    pub last_result: Option<&'a OperationResult>,
    /// Already cut to the history window
    pub history: &'a [HistoryRecord],
    pub last_failed_operation: Option<&'a PlannedAction>,
    pub retry_count: u32,
}

#[derive(Serialize)]
struct EnvironmentView<'a> {
    open_tabs: Vec<String>,
    current_tab: String,
    interactive_elements: Vec<&'a str>,
}

impl<'a> EnvironmentView<'a> {
    fn new(snapshot: &'a EnvironmentSnapshot) -> Self {
        Self {
            open_tabs: snapshot
                .open_resources
                .iter()
                .map(|tab| format!("{}. {} ({})", tab.index, tab.title, tab.url))
                .collect(),
            current_tab: format!(
                "{} ({})",
                snapshot.active_resource.title, snapshot.active_resource.url
            ),
            interactive_elements: snapshot
                .interactive_affordances
                .iter()
                .map(|a| a.descriptor.as_str())
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct HistoryView<'a> {
    operation: &'a PlannedAction,
    result: String,
}

fn history_views(history: &[HistoryRecord]) -> Vec<HistoryView<'_>> {
    history
        .iter()
        .map(|record| HistoryView {
            operation: &record.operation,
            result: record.result.describe(),
        })
        .collect()
}

fn to_yaml<T: Serialize>(value: &T) -> String {
    serde_yaml::to_string(value).unwrap_or_else(|e| format!("# unavailable: {}\n", e))
}

/// Remediation advice keyed off a failure's `error_type`
pub fn remediation_hint(error_type: &str) -> Option<&'static str> {
    if error_type == OperationFailure::PARAMETER_VALIDATION {
        Some("Check the parameters: every required field for the action must be present and well formed.")
    } else if error_type == OperationFailure::UNKNOWN_ACTION {
        Some("Use only an action from the list of available actions.")
    } else if is_transient_error_type(error_type) {
        Some("This looks like a network problem. Retry, or reach the goal another way.")
    } else if error_type.contains("NotFound") {
        Some("The target was not found. Use a more precise XPath from the interactive elements, or scroll to reveal it first.")
    } else if error_type == "RepeatedCallError" {
        Some("The same action was repeated without progress. Choose a different action.")
    } else {
        None
    }
}

/// Build the prompt asking for the next action
pub fn build_plan_prompt(ctx: &PlanContext<'_>) -> String {
    let mut prompt = String::new();

    prompt.push_str("# PILOT BROWSER AGENT\n\n");
    prompt.push_str(
        "You operate a web browser to accomplish a task. Decide the single next action.\n\n",
    );

    prompt.push_str("## TASK\n\n");
    prompt.push_str(ctx.task.as_str());
    prompt.push_str("\n\n");

    if let Some(operation) = ctx.last_operation {
        prompt.push_str("## LAST OPERATION\n\n");
        prompt.push_str(&to_yaml(operation));
        prompt.push('\n');
    }

    if let Some(result) = ctx.last_result {
        match result.as_failure() {
            Some(failure) => {
                prompt.push_str("## LAST OPERATION FAILED\n\n");
                prompt.push_str(&format!("**Error type:** {}\n", failure.error_type));
                prompt.push_str(&format!("**Message:** {}\n", failure.message));
                if let Some(hint) = remediation_hint(&failure.error_type) {
                    prompt.push_str(&format!("**Hint:** {}\n", hint));
                }
                if let Some(failed) = ctx.last_failed_operation {
                    prompt.push_str(&format!(
                        "**Failed operation:** {} {}\n",
                        failed.action,
                        serde_json::Value::Object(failed.params.clone())
                    ));
                }
                if ctx.retry_count > 0 {
                    prompt.push_str(&format!("**Attempt number:** {}\n", ctx.retry_count));
                }
                prompt.push('\n');
            }
            None => {
                prompt.push_str("## OPERATION RESULT\n\n");
                prompt.push_str(&result.describe());
                prompt.push_str("\n\n");
            }
        }
    }

    prompt.push_str("## ENVIRONMENT\n\n```yaml\n");
    prompt.push_str(&to_yaml(&EnvironmentView::new(ctx.snapshot)));
    prompt.push_str("```\n\n");

    if !ctx.history.is_empty() {
        prompt.push_str("## RECENT OPERATIONS\n\n```yaml\n");
        prompt.push_str(&to_yaml(&history_views(ctx.history)));
        prompt.push_str("```\n\n");
    }

    prompt.push_str("## AVAILABLE ACTIONS\n\n");
    for kind in ActionKind::ALL {
        prompt.push_str(&format!("- {}\n", kind.signature()));
    }
    prompt.push('\n');

    prompt.push_str("## OUTPUT FORMAT\n\n");
    prompt.push_str("Answer with one YAML document and nothing else:\n\n");
    prompt.push_str("```yaml\n");
    prompt.push_str("action: <action name>\n");
    prompt.push_str("params:\n");
    prompt.push_str("  xpath: <XPath of the target element, when the action needs one>\n");
    prompt.push_str("  text: <text to type, for input_text>\n");
    prompt.push_str("  keys: <keys to press, for send_keys>\n");
    prompt.push_str("  pixel: <scroll distance, for scroll_down and scroll_up>\n");
    prompt.push_str("  url: <address, for go_to_url, open_tab, close_tab and switch_tab>\n");
    prompt.push_str("  title: <tab title, for close_tab and switch_tab>\n");
    prompt.push_str("  file_paths: <list of files, for click_to_upload>\n");
    prompt.push_str("```\n\n");
    prompt.push_str("Only include the params the chosen action uses. Output YAML only.\n");

    prompt
}

/// Build the yes/no question asking whether the task is done
pub fn build_completion_prompt(
    task: &Task,
    history: &[HistoryRecord],
    snapshot: &EnvironmentSnapshot,
) -> String {
    let mut prompt = String::new();

    prompt.push_str("# TASK COMPLETION CHECK\n\n");
    prompt.push_str("## TASK\n\n");
    prompt.push_str(task.as_str());
    prompt.push_str("\n\n");

    prompt.push_str("## OPERATIONS SO FAR\n\n```yaml\n");
    prompt.push_str(&to_yaml(&history_views(history)));
    prompt.push_str("```\n\n");

    prompt.push_str("## CURRENT ENVIRONMENT\n\n```yaml\n");
    prompt.push_str(&to_yaml(&EnvironmentView::new(snapshot)));
    prompt.push_str("```\n\n");

    prompt.push_str("Has the task been completed? Answer yes or no.\n");
    prompt
}

/// Build the request for a short report of what the run did
pub fn build_summary_prompt(task: &Task, history: &[HistoryRecord]) -> String {
    let mut prompt = String::new();

    prompt.push_str("# RUN SUMMARY\n\n");
    prompt.push_str("## TASK\n\n");
    prompt.push_str(task.as_str());
    prompt.push_str("\n\n");

    prompt.push_str("## LAST OPERATIONS\n\n```yaml\n");
    prompt.push_str(&to_yaml(&history_views(history)));
    prompt.push_str("```\n\n");

    prompt.push_str("Summarize concisely what was done and whether the task was accomplished.\n");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_core::{Affordance, Params, ResourceDescriptor};
    use serde_json::json;

    fn snapshot() -> EnvironmentSnapshot {
        let tab = ResourceDescriptor {
            index: 1,
            title: "Search".to_string(),
            url: "https://search.example/".to_string(),
        };
        EnvironmentSnapshot {
            open_resources: vec![tab.clone()],
            active_resource: tab,
            interactive_affordances: vec![Affordance {
                index: 0,
                descriptor: "<input name='q'></input>".to_string(),
            }],
        }
    }

    fn click(xpath: &str) -> PlannedAction {
        let mut params = Params::new();
        params.insert("xpath".to_string(), json!(xpath));
        PlannedAction::new(ActionKind::ClickElement, params)
    }

    #[test]
    fn test_first_plan_prompt_has_no_previous_operation() {
        let task = Task::new("find the weather in Oslo");
        let snapshot = snapshot();
        let ctx = PlanContext {
            task: &task,
            snapshot: &snapshot,
            last_operation: None,
            last_result: None,
            history: &[],
            last_failed_operation: None,
            retry_count: 0,
        };

        let prompt = build_plan_prompt(&ctx);

        assert!(prompt.contains("## TASK\n\nfind the weather in Oslo"));
        assert!(prompt.contains("<input name='q'></input>"));
        assert!(prompt.contains("- input_text(xpath, text)\n"));
        assert!(!prompt.contains("## LAST OPERATION"));
        assert!(!prompt.contains("## RECENT OPERATIONS"));
        assert!(prompt.ends_with("Output YAML only.\n"));
    }

    #[test]
    fn test_failure_section_carries_hint_and_attempt() {
        let task = Task::new("open the docs");
        let snapshot = snapshot();
        let op = click("//a[text()='Docs']");
        let result = OperationResult::failure(
            "ElementNotFoundError",
            "click_element failed: no element",
            Some("click_element"),
            op.params.clone(),
        );
        let ctx = PlanContext {
            task: &task,
            snapshot: &snapshot,
            last_operation: Some(&op),
            last_result: Some(&result),
            history: &[],
            last_failed_operation: Some(&op),
            retry_count: 2,
        };

        let prompt = build_plan_prompt(&ctx);

        assert!(prompt.contains("## LAST OPERATION FAILED"));
        assert!(prompt.contains("**Error type:** ElementNotFoundError"));
        assert!(prompt.contains("more precise XPath"));
        assert!(prompt.contains("**Attempt number:** 2"));
    }

    #[test]
    fn test_success_result_is_reported() {
        let task = Task::new("open the docs");
        let snapshot = snapshot();
        let op = click("//a");
        let result = OperationResult::success("Clicked element //a");
        let history = vec![HistoryRecord {
            operation: op.clone(),
            result: result.clone(),
        }];
        let ctx = PlanContext {
            task: &task,
            snapshot: &snapshot,
            last_operation: Some(&op),
            last_result: Some(&result),
            history: &history,
            last_failed_operation: None,
            retry_count: 0,
        };

        let prompt = build_plan_prompt(&ctx);

        assert!(prompt.contains("## OPERATION RESULT\n\nClicked element //a"));
        assert!(prompt.contains("## RECENT OPERATIONS"));
        assert!(!prompt.contains("FAILED"));
    }

    #[test]
    fn test_remediation_hints() {
        assert!(remediation_hint("parameter_validation").is_some());
        assert!(remediation_hint("TimeoutError").unwrap().contains("network"));
        assert!(remediation_hint("TabNotFoundError").unwrap().contains("not found"));
        assert!(remediation_hint("BrowserError").is_none());
    }

    #[test]
    fn test_completion_and_summary_prompts() {
        let task = Task::new("log in");
        let history = vec![HistoryRecord {
            operation: click("//button"),
            result: OperationResult::success("ok"),
        }];

        let completion = build_completion_prompt(&task, &history, &snapshot());
        assert!(completion.contains("log in"));
        assert!(completion.contains("//button"));
        assert!(completion.ends_with("Answer yes or no.\n"));

        let summary = build_summary_prompt(&task, &history);
        assert!(summary.contains("Summarize concisely"));
    }
}
