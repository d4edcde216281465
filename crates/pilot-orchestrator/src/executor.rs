//! Action executor
//!
//! Turns a [`PlannedAction`] into a typed driver call. Parameters are checked
//! before anything reaches the browser, and every failure comes back as a
//! structured [`OperationResult`] instead of an error.

use pilot_browser::BrowserDriver;
use pilot_core::{
    ActionKind, OperationFailure, OperationResult, Params, PlannedAction, Result,
    DEFAULT_SCROLL_PX,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// A validated action with its parameters extracted
#[derive(Debug, Clone, PartialEq)]
enum ActionCall {
    ClickElement { xpath: String },
    ClickToUpload { xpath: String, file_paths: Vec<String> },
    InputText { xpath: String, text: String },
    SendKeys { xpath: String, keys: String },
    ScrollDown { pixel: i64 },
    ScrollUp { pixel: i64 },
    GoToUrl { url: String },
    OpenTab { url: String },
    GoBack,
    CloseTab { title: Option<String>, url: Option<String> },
    SwitchTab { title: Option<String>, url: Option<String> },
}

impl ActionCall {
    fn extract(planned: &PlannedAction) -> std::result::Result<Self, String> {
        let p = &planned.params;
        let action = planned.action;
        let call = match action {
            ActionKind::ClickElement => ActionCall::ClickElement {
                xpath: required_text(action, p, "xpath")?,
            },
            ActionKind::ClickToUpload => ActionCall::ClickToUpload {
                xpath: required_text(action, p, "xpath")?,
                file_paths: file_paths(action, p)?,
            },
            ActionKind::InputText => ActionCall::InputText {
                xpath: required_text(action, p, "xpath")?,
                text: required_text(action, p, "text")?,
            },
            ActionKind::SendKeys => ActionCall::SendKeys {
                xpath: required_text(action, p, "xpath")?,
                keys: required_text(action, p, "keys")?,
            },
            ActionKind::ScrollDown => ActionCall::ScrollDown {
                pixel: pixel(action, p)?,
            },
            ActionKind::ScrollUp => ActionCall::ScrollUp {
                pixel: pixel(action, p)?,
            },
            ActionKind::GoToUrl => ActionCall::GoToUrl {
                url: required_text(action, p, "url")?,
            },
            ActionKind::OpenTab => ActionCall::OpenTab {
                url: required_text(action, p, "url")?,
            },
            ActionKind::GoBack => ActionCall::GoBack,
            ActionKind::CloseTab => ActionCall::CloseTab {
                title: optional_text(p, "title"),
                url: optional_text(p, "url"),
            },
            ActionKind::SwitchTab => ActionCall::SwitchTab {
                title: optional_text(p, "title"),
                url: optional_text(p, "url"),
            },
        };
        Ok(call)
    }
}

/// Scalars are accepted as text; YAML happily turns `text: 42` into a number
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn required_text(action: ActionKind, params: &Params, name: &str) -> std::result::Result<String, String> {
    match params.get(name) {
        None | Some(Value::Null) => Err(format!(
            "{} requires parameter '{}' ({})",
            action,
            name,
            action.signature()
        )),
        Some(value) => scalar_text(value)
            .ok_or_else(|| format!("{}: parameter '{}' must be text, got {}", action, name, value)),
    }
}

fn optional_text(params: &Params, name: &str) -> Option<String> {
    params
        .get(name)
        .and_then(scalar_text)
        .filter(|s| !s.is_empty())
}

fn pixel(action: ActionKind, params: &Params) -> std::result::Result<i64, String> {
    match params.get("pixel") {
        None | Some(Value::Null) => Ok(DEFAULT_SCROLL_PX),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| format!("{}: pixel out of range: {}", action, n)),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| format!("{}: pixel must be an integer, got '{}'", action, s)),
        Some(other) => Err(format!("{}: pixel must be an integer, got {}", action, other)),
    }
}

fn file_paths(action: ActionKind, params: &Params) -> std::result::Result<Vec<String>, String> {
    match params.get("file_paths") {
        None | Some(Value::Null) => Err(format!(
            "{} requires parameter 'file_paths' ({})",
            action,
            action.signature()
        )),
        Some(Value::String(path)) => Ok(vec![path.clone()]),
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| format!("{}: file_paths entries must be text, got {}", action, item))
            })
            .collect(),
        Some(other) => Err(format!(
            "{}: file_paths must be a path or a non-empty list of paths, got {}",
            action, other
        )),
    }
}

/// Dispatches planned actions to a browser driver
pub struct Executor<D> {
    driver: Arc<D>,
}

impl<D: BrowserDriver> Executor<D> {
    pub fn new(driver: Arc<D>) -> Self {
        Self { driver }
    }

    /// Execute one action; never returns an error, failures are in the result
    pub async fn execute(&self, planned: &PlannedAction) -> OperationResult {
        let name = planned.action.name();

        let call = match ActionCall::extract(planned) {
            Ok(call) => call,
            Err(message) => {
                debug!("Rejected {}: {}", name, message);
                return OperationResult::failure(
                    OperationFailure::PARAMETER_VALIDATION,
                    message,
                    Some(name),
                    planned.params.clone(),
                );
            }
        };

        match self.dispatch(call).await {
            Ok(payload) => OperationResult::success(payload),
            Err(e) => {
                warn!("{} failed: {}", name, e);
                OperationResult::failure(
                    e.error_type(),
                    format!("{} failed: {}", name, e),
                    Some(name),
                    planned.params.clone(),
                )
            }
        }
    }

    /// Execute an action given by name, as typed by a user
    pub async fn execute_raw(&self, action: &str, params: Params) -> OperationResult {
        match action.parse::<ActionKind>() {
            Ok(kind) => self.execute(&PlannedAction::new(kind, params)).await,
            Err(message) => {
                OperationResult::failure(OperationFailure::UNKNOWN_ACTION, message, Some(action), params)
            }
        }
    }

    async fn dispatch(&self, call: ActionCall) -> Result<Value> {
        let driver = &self.driver;
        match call {
            ActionCall::ClickElement { xpath } => driver.click_element(&xpath).await,
            ActionCall::ClickToUpload { xpath, file_paths } => {
                driver.click_to_upload(&xpath, &file_paths).await
            }
            ActionCall::InputText { xpath, text } => driver.input_text(&xpath, &text).await,
            ActionCall::SendKeys { xpath, keys } => driver.send_keys(&xpath, &keys).await,
            ActionCall::ScrollDown { pixel } => driver.scroll_down(pixel).await,
            ActionCall::ScrollUp { pixel } => driver.scroll_up(pixel).await,
            ActionCall::GoToUrl { url } => driver.go_to_url(&url).await,
            ActionCall::OpenTab { url } => driver.open_tab(&url).await,
            ActionCall::GoBack => driver.go_back().await,
            ActionCall::CloseTab { title, url } => {
                driver.close_tab(title.as_deref(), url.as_deref()).await
            }
            ActionCall::SwitchTab { title, url } => {
                driver.switch_tab(title.as_deref(), url.as_deref()).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_browser::MockBrowser;
    use pilot_core::PilotError;
    use serde_json::json;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => Params::new(),
        }
    }

    fn executor() -> (Arc<MockBrowser>, Executor<MockBrowser>) {
        let mock = Arc::new(MockBrowser::new());
        (Arc::clone(&mock), Executor::new(mock))
    }

    #[tokio::test]
    async fn test_missing_text_is_rejected_before_the_driver() {
        let (mock, executor) = executor();
        let action = PlannedAction::new(ActionKind::InputText, params(json!({ "xpath": "//input" })));

        let result = executor.execute(&action).await;

        assert_eq!(result.error_type(), Some("parameter_validation"));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_scroll_defaults_to_300() {
        let (mock, executor) = executor();

        let result = executor
            .execute(&PlannedAction::new(ActionKind::ScrollDown, Params::new()))
            .await;

        assert!(!result.is_error());
        assert_eq!(mock.calls()[0].args, json!({ "pixel": 300 }));
    }

    #[tokio::test]
    async fn test_scalar_coercions() {
        let (mock, executor) = executor();

        executor
            .execute(&PlannedAction::new(
                ActionKind::InputText,
                params(json!({ "xpath": "//input", "text": 1234 })),
            ))
            .await;
        executor
            .execute(&PlannedAction::new(
                ActionKind::ScrollUp,
                params(json!({ "pixel": "120" })),
            ))
            .await;
        executor
            .execute(&PlannedAction::new(
                ActionKind::ClickToUpload,
                params(json!({ "xpath": "//input[@type='file']", "file_paths": "/tmp/a.txt" })),
            ))
            .await;

        let calls = mock.calls();
        assert_eq!(calls[0].args["text"], json!("1234"));
        assert_eq!(calls[1].args, json!({ "pixel": 120 }));
        assert_eq!(calls[2].args["file_paths"], json!(["/tmp/a.txt"]));
    }

    #[tokio::test]
    async fn test_driver_failure_becomes_structured() {
        let mock = Arc::new(MockBrowser::new());
        mock.fail_always(ActionKind::ClickElement, || {
            PilotError::ElementNotFound("//nope".to_string())
        });
        let executor = Executor::new(Arc::clone(&mock));
        let action = PlannedAction::new(ActionKind::ClickElement, params(json!({ "xpath": "//nope" })));

        let result = executor.execute(&action).await;

        let failure = result.as_failure().unwrap();
        assert_eq!(failure.error_type, "ElementNotFoundError");
        assert!(failure.message.starts_with("click_element failed"));
        assert_eq!(failure.action.as_deref(), Some("click_element"));
        assert_eq!(failure.params["xpath"], json!("//nope"));
    }

    #[tokio::test]
    async fn test_unknown_action_name() {
        let (mock, executor) = executor();

        let result = executor.execute_raw("hover", Params::new()).await;

        assert_eq!(result.error_type(), Some("unknown_action"));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_tab_actions_pass_optional_filters() {
        let (mock, executor) = executor();

        let result = executor
            .execute_raw("switch_tab", params(json!({ "title": "Docs" })))
            .await;

        assert!(!result.is_error());
        assert_eq!(mock.calls()[0].args, json!({ "title": "Docs", "url": null }));
    }

    #[test]
    fn test_bad_upload_list() {
        let action = PlannedAction::new(
            ActionKind::ClickToUpload,
            params(json!({ "xpath": "//input", "file_paths": [] })),
        );
        assert!(ActionCall::extract(&action).is_err());
    }
}
