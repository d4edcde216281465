//! Data model shared by the planner, executor and flow controller

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Parameter mapping carried by a planned action
pub type Params = Map<String, Value>;

/// Natural-language goal for a run. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task(String);

impl Task {
    pub fn new(goal: impl Into<String>) -> Self {
        Self(goal.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First line of the goal, for log headers
    pub fn headline(&self) -> &str {
        self.0.lines().next().unwrap_or(&self.0).trim()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An open tab (or the active one)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub index: usize,
    pub title: String,
    pub url: String,
}

/// An indexed interactive element, described as a compact tag string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affordance {
    pub index: usize,
    pub descriptor: String,
}

/// Point-in-time view of the browser. Superseded, never merged, by the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub open_resources: Vec<ResourceDescriptor>,
    pub active_resource: ResourceDescriptor,
    pub interactive_affordances: Vec<Affordance>,
}

/// The closed set of actions the planner may emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ClickElement,
    ClickToUpload,
    InputText,
    SendKeys,
    ScrollDown,
    ScrollUp,
    GoToUrl,
    OpenTab,
    GoBack,
    CloseTab,
    SwitchTab,
}

/// Default scroll distance in pixels
pub const DEFAULT_SCROLL_PX: i64 = 300;

impl ActionKind {
    pub const ALL: [ActionKind; 11] = [
        ActionKind::ClickElement,
        ActionKind::ClickToUpload,
        ActionKind::InputText,
        ActionKind::SendKeys,
        ActionKind::ScrollDown,
        ActionKind::ScrollUp,
        ActionKind::GoToUrl,
        ActionKind::OpenTab,
        ActionKind::GoBack,
        ActionKind::CloseTab,
        ActionKind::SwitchTab,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::ClickElement => "click_element",
            ActionKind::ClickToUpload => "click_to_upload",
            ActionKind::InputText => "input_text",
            ActionKind::SendKeys => "send_keys",
            ActionKind::ScrollDown => "scroll_down",
            ActionKind::ScrollUp => "scroll_up",
            ActionKind::GoToUrl => "go_to_url",
            ActionKind::OpenTab => "open_tab",
            ActionKind::GoBack => "go_back",
            ActionKind::CloseTab => "close_tab",
            ActionKind::SwitchTab => "switch_tab",
        }
    }

    /// Parameters that must be present before the environment is touched
    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            ActionKind::ClickElement => &["xpath"],
            ActionKind::ClickToUpload => &["xpath", "file_paths"],
            ActionKind::InputText => &["xpath", "text"],
            ActionKind::SendKeys => &["xpath", "keys"],
            ActionKind::GoToUrl | ActionKind::OpenTab => &["url"],
            ActionKind::ScrollDown
            | ActionKind::ScrollUp
            | ActionKind::GoBack
            | ActionKind::CloseTab
            | ActionKind::SwitchTab => &[],
        }
    }

    pub fn optional_params(&self) -> &'static [&'static str] {
        match self {
            ActionKind::ScrollDown | ActionKind::ScrollUp => &["pixel"],
            ActionKind::CloseTab | ActionKind::SwitchTab => &["title", "url"],
            _ => &[],
        }
    }

    /// Whether the action targets an element through an XPath locator
    pub fn takes_locator(&self) -> bool {
        self.required_params().contains(&"xpath")
    }

    /// Signature line used when listing the vocabulary in prompts
    pub fn signature(&self) -> &'static str {
        match self {
            ActionKind::ClickElement => "click_element(xpath)",
            ActionKind::ClickToUpload => "click_to_upload(xpath, file_paths)",
            ActionKind::InputText => "input_text(xpath, text)",
            ActionKind::SendKeys => "send_keys(xpath, keys)",
            ActionKind::ScrollDown => "scroll_down(pixel: int = 300)",
            ActionKind::ScrollUp => "scroll_up(pixel: int = 300)",
            ActionKind::GoToUrl => "go_to_url(url)",
            ActionKind::OpenTab => "open_tab(url)",
            ActionKind::GoBack => "go_back()",
            ActionKind::CloseTab => "close_tab(title: optional, url: optional)",
            ActionKind::SwitchTab => "switch_tab(title: optional, url: optional)",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ActionKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| format!("Unknown action: {}", s))
    }
}

/// One structured action produced by the planner and consumed once by the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub action: ActionKind,
    #[serde(default)]
    pub params: Params,
}

impl PlannedAction {
    pub fn new(action: ActionKind, params: Params) -> Self {
        Self { action, params }
    }

    /// The safe idle action used when no usable plan can be obtained
    pub fn idle_scroll(pixel: i64) -> Self {
        let mut params = Params::new();
        params.insert("pixel".to_string(), Value::from(pixel));
        Self::new(ActionKind::ScrollDown, params)
    }

    /// String value of a parameter, if present and a string
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }
}

/// A failed operation, as reported to the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationFailure {
    /// Always `true`; kept so the serialized form is self-describing
    pub error: bool,
    pub error_type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub params: Params,
}

impl OperationFailure {
    /// Required parameter missing or malformed
    pub const PARAMETER_VALIDATION: &'static str = "parameter_validation";
    /// Action name outside the vocabulary
    pub const UNKNOWN_ACTION: &'static str = "unknown_action";
}

/// Outcome of one executor call: a success payload or a structured failure, never both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationResult {
    Failure(OperationFailure),
    Success(Value),
}

impl OperationResult {
    pub fn success(payload: impl Into<Value>) -> Self {
        OperationResult::Success(payload.into())
    }

    pub fn failure(
        error_type: impl Into<String>,
        message: impl Into<String>,
        action: Option<&str>,
        params: Params,
    ) -> Self {
        OperationResult::Failure(OperationFailure {
            error: true,
            error_type: error_type.into(),
            message: message.into(),
            action: action.map(str::to_string),
            params,
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, OperationResult::Failure(_))
    }

    pub fn as_failure(&self) -> Option<&OperationFailure> {
        match self {
            OperationResult::Failure(failure) => Some(failure),
            OperationResult::Success(_) => None,
        }
    }

    pub fn error_type(&self) -> Option<&str> {
        self.as_failure().map(|f| f.error_type.as_str())
    }

    /// Short human-readable rendering for logs and prompts
    pub fn describe(&self) -> String {
        match self {
            OperationResult::Success(Value::String(text)) => text.clone(),
            OperationResult::Success(Value::Null) => "ok".to_string(),
            OperationResult::Success(other) => other.to_string(),
            OperationResult::Failure(f) => format!("{}: {}", f.error_type, f.message),
        }
    }
}

/// An executed action paired with its terminal result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub operation: PlannedAction,
    pub result: OperationResult,
}
