//! In-memory driver for tests

use crate::driver::BrowserDriver;
use async_trait::async_trait;
use pilot_core::{ActionKind, Affordance, PilotError, ResourceDescriptor, Result};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// One recorded driver call
#[derive(Debug, Clone, PartialEq)]
pub struct DriverCall {
    pub name: String,
    pub args: Value,
}

/// Mock driver for testing without a browser
///
/// Actions succeed with a short description unless a result was scripted for
/// them (consumed in order) or they were set to fail on every call.
pub struct MockBrowser {
    scripted: Mutex<HashMap<ActionKind, VecDeque<Result<Value>>>>,
    always_failing: Mutex<HashMap<ActionKind, fn() -> PilotError>>,
    match_counts: Mutex<HashMap<String, usize>>,
    calls: Mutex<Vec<DriverCall>>,
    tabs: Vec<ResourceDescriptor>,
    affordances: Vec<Affordance>,
    unavailable: AtomicBool,
    highlighted: AtomicBool,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self {
            scripted: Mutex::new(HashMap::new()),
            always_failing: Mutex::new(HashMap::new()),
            match_counts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            tabs: vec![ResourceDescriptor {
                index: 1,
                title: "Example Domain".to_string(),
                url: "https://example.com/".to_string(),
            }],
            affordances: vec![
                Affordance {
                    index: 0,
                    descriptor: "<a href='https://www.iana.org/domains/example'>More information...</a>"
                        .to_string(),
                },
                Affordance {
                    index: 1,
                    descriptor: "<input name='q' type='text' placeholder='Search'></input>".to_string(),
                },
            ],
            unavailable: AtomicBool::new(false),
            highlighted: AtomicBool::new(false),
        }
    }

    /// Queue a result for the next call of `action`
    pub fn script(&self, action: ActionKind, result: Result<Value>) {
        lock(&self.scripted)
            .entry(action)
            .or_default()
            .push_back(result);
    }

    /// Make every call of `action` fail with the error built by `error`
    pub fn fail_always(&self, action: ActionKind, error: fn() -> PilotError) {
        lock(&self.always_failing).insert(action, error);
    }

    /// Set how many elements `xpath` resolves to (default 1)
    pub fn set_match_count(&self, xpath: &str, count: usize) {
        lock(&self.match_counts).insert(xpath.to_string(), count);
    }

    /// Make perception calls fail as if the browser went away
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        lock(&self.calls).clone()
    }

    pub fn calls_to(&self, name: &str) -> usize {
        lock(&self.calls).iter().filter(|c| c.name == name).count()
    }

    /// Whether element highlights are currently shown
    pub fn is_highlighted(&self) -> bool {
        self.highlighted.load(Ordering::SeqCst)
    }

    fn record(&self, name: &str, args: Value) {
        lock(&self.calls).push(DriverCall {
            name: name.to_string(),
            args,
        });
    }

    fn act(&self, action: ActionKind, args: Value) -> Result<Value> {
        self.record(action.name(), args);

        if let Some(error) = lock(&self.always_failing).get(&action) {
            return Err(error());
        }

        let scripted = lock(&self.scripted)
            .get_mut(&action)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(Value::from(format!("{} ok", action.name()))))
    }

    fn perceive(&self, name: &str) -> Result<()> {
        self.record(name, Value::Null);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PilotError::Connection("browser is not reachable".to_string()));
        }
        Ok(())
    }
}

impl Default for MockBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserDriver for MockBrowser {
    async fn click_element(&self, xpath: &str) -> Result<Value> {
        self.act(ActionKind::ClickElement, json!({ "xpath": xpath }))
    }

    async fn click_to_upload(&self, xpath: &str, file_paths: &[String]) -> Result<Value> {
        self.act(
            ActionKind::ClickToUpload,
            json!({ "xpath": xpath, "file_paths": file_paths }),
        )
    }

    async fn input_text(&self, xpath: &str, text: &str) -> Result<Value> {
        self.act(ActionKind::InputText, json!({ "xpath": xpath, "text": text }))
    }

    async fn send_keys(&self, xpath: &str, keys: &str) -> Result<Value> {
        self.act(ActionKind::SendKeys, json!({ "xpath": xpath, "keys": keys }))
    }

    async fn scroll_down(&self, pixel: i64) -> Result<Value> {
        self.act(ActionKind::ScrollDown, json!({ "pixel": pixel }))
    }

    async fn scroll_up(&self, pixel: i64) -> Result<Value> {
        self.act(ActionKind::ScrollUp, json!({ "pixel": pixel }))
    }

    async fn go_to_url(&self, url: &str) -> Result<Value> {
        self.act(ActionKind::GoToUrl, json!({ "url": url }))
    }

    async fn open_tab(&self, url: &str) -> Result<Value> {
        self.act(ActionKind::OpenTab, json!({ "url": url }))
    }

    async fn go_back(&self) -> Result<Value> {
        self.act(ActionKind::GoBack, json!({}))
    }

    async fn close_tab(&self, title: Option<&str>, url: Option<&str>) -> Result<Value> {
        self.act(ActionKind::CloseTab, json!({ "title": title, "url": url }))
    }

    async fn switch_tab(&self, title: Option<&str>, url: Option<&str>) -> Result<Value> {
        self.act(ActionKind::SwitchTab, json!({ "title": title, "url": url }))
    }

    async fn list_tabs(&self) -> Result<Vec<ResourceDescriptor>> {
        self.perceive("list_tabs")?;
        Ok(self.tabs.clone())
    }

    async fn active_tab(&self) -> Result<ResourceDescriptor> {
        self.perceive("active_tab")?;
        Ok(self.tabs.first().cloned().unwrap_or_default())
    }

    async fn interactive_elements(&self) -> Result<Vec<Affordance>> {
        self.perceive("interactive_elements")?;
        self.highlighted.store(true, Ordering::SeqCst);
        Ok(self.affordances.clone())
    }

    async fn remove_highlight(&self) -> Result<()> {
        self.record("remove_highlight", Value::Null);
        self.highlighted.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn count_matches(&self, xpath: &str) -> Result<usize> {
        self.record("count_matches", json!({ "xpath": xpath }));
        Ok(lock(&self.match_counts).get(xpath).copied().unwrap_or(1))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
