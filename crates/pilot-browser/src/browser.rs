//! Browser session over the Chrome DevTools Protocol
//!
//! `headless_chrome` is a blocking client. Every CDP round-trip is moved to
//! tokio's blocking pool so the control loop never stalls a runtime worker.

use crate::dom;
use crate::driver::BrowserDriver;
use crate::locator::normalize_xpath;
use async_trait::async_trait;
use headless_chrome::protocol::cdp::DOM;
use headless_chrome::{Browser, LaunchOptions, Tab};
use pilot_core::{Affordance, BrowserSettings, PilotError, ResourceDescriptor, Result};
use serde_json::Value;
use std::fmt::Display;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Key names sent as a single key press rather than typed text
const NAMED_KEYS: &[&str] = &[
    "Enter", "Tab", "Escape", "Backspace", "Delete", "Space", "ArrowUp", "ArrowDown",
    "ArrowLeft", "ArrowRight", "Home", "End", "PageUp", "PageDown",
];

/// Configuration for browser launch
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run in headless mode (default: true)
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Per-call CDP timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self::from(&BrowserSettings::default())
    }
}

impl From<&BrowserSettings> for BrowserConfig {
    fn from(settings: &BrowserSettings) -> Self {
        Self {
            headless: settings.headless,
            window_width: settings.window_width,
            window_height: settings.window_height,
            timeout_seconds: settings.timeout_seconds,
        }
    }
}

/// Active browser session
pub struct BrowserSession {
    browser: Browser,
    /// Tab that actions and snapshots target
    active: Mutex<Arc<Tab>>,
    config: BrowserConfig,
}

impl BrowserSession {
    /// Launch a new browser instance
    pub async fn launch() -> Result<Self> {
        Self::launch_with_config(BrowserConfig::default()).await
    }

    /// Launch browser with custom configuration
    pub async fn launch_with_config(config: BrowserConfig) -> Result<Self> {
        info!(
            "Launching browser (headless: {}, size: {}x{})",
            config.headless, config.window_width, config.window_height
        );

        let launch_config = config.clone();
        let (browser, tab) = blocking("launch", move || {
            let options = LaunchOptions::default_builder()
                .headless(launch_config.headless)
                .window_size(Some((launch_config.window_width, launch_config.window_height)))
                .idle_browser_timeout(Duration::from_secs(3600))
                .build()
                .map_err(|e| PilotError::Connection(format!("Invalid launch options: {}", e)))?;

            let browser = Browser::new(options)
                .map_err(|e| PilotError::Connection(format!("Failed to launch browser: {}", e)))?;
            let tab = browser
                .new_tab()
                .map_err(|e| classify("create tab", e))?;
            Ok((browser, tab))
        })
        .await?;

        info!("Browser launched successfully");
        Ok(Self::with_tab(browser, tab, config))
    }

    /// Attach to a browser started with `--remote-debugging-port`
    pub async fn connect(port: u16, config: BrowserConfig) -> Result<Self> {
        info!("Connecting to existing browser on port {}", port);

        let version_url = format!("http://127.0.0.1:{}/json/version", port);
        let version: Value = reqwest::get(&version_url)
            .await
            .map_err(|e| PilotError::Connection(format!("No DevTools endpoint at {}: {}", version_url, e)))?
            .json()
            .await
            .map_err(|e| PilotError::Connection(format!("Malformed DevTools response: {}", e)))?;
        let ws_url = version["webSocketDebuggerUrl"]
            .as_str()
            .ok_or_else(|| {
                PilotError::Connection("DevTools response has no webSocketDebuggerUrl".to_string())
            })?
            .to_string();

        let (browser, tab) = blocking("connect", move || {
            let browser = Browser::connect(ws_url)
                .map_err(|e| PilotError::Connection(format!("Failed to connect to browser: {}", e)))?;
            let existing = all_tabs(&browser).into_iter().next();
            let tab = match existing {
                Some(tab) => tab,
                None => browser.new_tab().map_err(|e| classify("create tab", e))?,
            };
            Ok((browser, tab))
        })
        .await?;

        info!("Connected to browser successfully");
        Ok(Self::with_tab(browser, tab, config))
    }

    /// Launch or connect according to the `[browser]` config section
    pub async fn from_settings(settings: &BrowserSettings) -> Result<Self> {
        let config = BrowserConfig::from(settings);
        match settings.debug_port {
            Some(port) => Self::connect(port, config).await,
            None => Self::launch_with_config(config).await,
        }
    }

    fn with_tab(browser: Browser, tab: Arc<Tab>, config: BrowserConfig) -> Self {
        tab.set_default_timeout(Duration::from_secs(config.timeout_seconds));
        Self {
            browser,
            active: Mutex::new(tab),
            config,
        }
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    fn active(&self) -> Arc<Tab> {
        lock(&self.active).clone()
    }

    fn set_active(&self, tab: Arc<Tab>) {
        tab.set_default_timeout(Duration::from_secs(self.config.timeout_seconds));
        *lock(&self.active) = tab;
    }

    /// Run a script on the active tab and insist that it found its element
    async fn on_element(&self, operation: &'static str, xpath: &str, script: String) -> Result<Arc<Tab>> {
        let tab = self.active();
        let outcome = blocking(operation, {
            let tab = Arc::clone(&tab);
            move || evaluate(&tab, &script)
        })
        .await?;

        if outcome.as_str() == Some(dom::NOT_FOUND) {
            return Err(PilotError::ElementNotFound(xpath.to_string()));
        }
        Ok(tab)
    }

    /// Find the tab to switch to or close
    async fn matching_tab(&self, title: Option<&str>, url: Option<&str>) -> Result<Arc<Tab>> {
        let tabs = all_tabs(&self.browser);
        let descriptors = blocking("describe tabs", {
            let tabs = tabs.clone();
            move || Ok(describe_tabs(&tabs))
        })
        .await?;
        find_tab(&descriptors, title, url)
            .and_then(|i| tabs.get(i).cloned())
            .ok_or_else(|| {
                PilotError::TabNotFound(format!("title={:?}, url={:?}", title, url))
            })
    }

    fn tab_with_url(&self, url: &str) -> Option<Arc<Tab>> {
        all_tabs(&self.browser)
            .into_iter()
            .find(|tab| tab.get_url() == url)
    }
}

#[async_trait]
impl BrowserDriver for BrowserSession {
    #[instrument(skip(self))]
    async fn click_element(&self, xpath: &str) -> Result<Value> {
        let xpath = normalize_xpath(xpath);
        let tab = self.on_element("click_element", &xpath, dom::click(&xpath)).await?;
        info!("Clicked {}", xpath);
        Ok(Value::from(format!("Clicked element {} on {}", xpath, tab.get_url())))
    }

    #[instrument(skip(self))]
    async fn click_to_upload(&self, xpath: &str, file_paths: &[String]) -> Result<Value> {
        let xpath = normalize_xpath(xpath);
        let target = dom::upload_target(&xpath);
        let files = file_paths.to_vec();
        let tab = self.active();

        blocking("click_to_upload", move || {
            let element = tab
                .find_element_by_xpath(&target)
                .map_err(|e| classify(&format!("find file input for {}", target), e))?;
            tab.call_method(DOM::SetFileInputFiles {
                files,
                node_id: None,
                backend_node_id: None,
                object_id: Some(element.remote_object_id.clone()),
            })
            .map_err(|e| classify("set input files", e))?;
            Ok(())
        })
        .await?;

        info!("Attached {} file(s) via {}", file_paths.len(), xpath);
        Ok(Value::from(format!(
            "Uploaded {} file(s) through {}",
            file_paths.len(),
            xpath
        )))
    }

    #[instrument(skip(self))]
    async fn input_text(&self, xpath: &str, text: &str) -> Result<Value> {
        let xpath = normalize_xpath(xpath);
        let tab = self
            .on_element("input_text", &xpath, dom::focus(&xpath, true))
            .await?;

        let typed = text.to_string();
        blocking("input_text", move || {
            tab.type_str(&typed).map_err(|e| classify("type text", e))?;
            tab.press_key("Enter").map_err(|e| classify("press Enter", e))?;
            Ok(())
        })
        .await?;

        Ok(Value::from(format!("Typed '{}' into {} and pressed Enter", text, xpath)))
    }

    #[instrument(skip(self))]
    async fn send_keys(&self, xpath: &str, keys: &str) -> Result<Value> {
        let xpath = normalize_xpath(xpath);
        let tab = self
            .on_element("send_keys", &xpath, dom::focus(&xpath, false))
            .await?;

        let keys_owned = keys.to_string();
        blocking("send_keys", move || {
            if NAMED_KEYS.contains(&keys_owned.as_str()) {
                tab.press_key(&keys_owned).map_err(|e| classify("press key", e))?;
            } else {
                tab.type_str(&keys_owned).map_err(|e| classify("type keys", e))?;
            }
            Ok(())
        })
        .await?;

        Ok(Value::from(format!("Sent '{}' to {}", keys, xpath)))
    }

    #[instrument(skip(self))]
    async fn scroll_down(&self, pixel: i64) -> Result<Value> {
        let tab = self.active();
        let script = dom::scroll_by(pixel);
        blocking("scroll_down", move || evaluate(&tab, &script)).await?;
        Ok(Value::from(format!("Scrolled down {}px", pixel)))
    }

    #[instrument(skip(self))]
    async fn scroll_up(&self, pixel: i64) -> Result<Value> {
        let tab = self.active();
        let script = dom::scroll_by(-pixel);
        blocking("scroll_up", move || evaluate(&tab, &script)).await?;
        Ok(Value::from(format!("Scrolled up {}px", pixel)))
    }

    #[instrument(skip(self))]
    async fn go_to_url(&self, url: &str) -> Result<Value> {
        require_http(url)?;

        if let Some(existing) = self.tab_with_url(url) {
            blocking("activate tab", {
                let tab = Arc::clone(&existing);
                move || tab.activate().map(|_| ()).map_err(|e| classify("activate tab", e))
            })
            .await?;
            self.set_active(existing);
            info!("Already open, switched to {}", url);
            return Ok(Value::from(format!("Switched to already open page {}", url)));
        }

        let tab = self.active();
        let target = url.to_string();
        blocking("go_to_url", move || navigate(&tab, &target)).await?;

        info!("Navigated to {}", url);
        Ok(Value::from(format!("Opened {}", url)))
    }

    #[instrument(skip(self))]
    async fn open_tab(&self, url: &str) -> Result<Value> {
        require_http(url)?;

        if let Some(existing) = self.tab_with_url(url) {
            self.set_active(existing);
            return Ok(Value::from(format!("Switched to already open tab {}", url)));
        }

        let browser = self.browser.clone();
        let target = url.to_string();
        let tab = blocking("open_tab", move || {
            let tab = browser.new_tab().map_err(|e| classify("open tab", e))?;
            navigate(&tab, &target)?;
            Ok(tab)
        })
        .await?;

        self.set_active(tab);
        info!("Opened new tab {}", url);
        Ok(Value::from(format!("Opened new tab {}", url)))
    }

    #[instrument(skip(self))]
    async fn go_back(&self) -> Result<Value> {
        let tab = self.active();
        let title = blocking("go_back", move || {
            evaluate(&tab, "history.back()")?;
            tab.wait_until_navigated()
                .map_err(|e| classify("wait for navigation", e))?;
            Ok(tab.get_title().unwrap_or_default())
        })
        .await?;
        Ok(Value::from(format!("Went back to '{}'", title)))
    }

    #[instrument(skip(self))]
    async fn close_tab(&self, title: Option<&str>, url: Option<&str>) -> Result<Value> {
        let target = if title.is_none() && url.is_none() {
            self.active()
        } else {
            self.matching_tab(title, url).await?
        };
        let was_active = Arc::ptr_eq(&target, &self.active());
        let closed_url = target.get_url();

        blocking("close_tab", move || {
            target.close(true).map_err(|e| classify("close tab", e))?;
            Ok(())
        })
        .await?;

        if was_active {
            let remaining = all_tabs(&self.browser)
                .into_iter()
                .rev()
                .find(|tab| tab.get_url() != closed_url);
            let next = match remaining {
                Some(tab) => tab,
                None => {
                    let browser = self.browser.clone();
                    blocking("open blank tab", move || {
                        browser.new_tab().map_err(|e| classify("open tab", e))
                    })
                    .await?
                }
            };
            self.set_active(next);
        }

        Ok(Value::from(format!("Closed tab {}", closed_url)))
    }

    #[instrument(skip(self))]
    async fn switch_tab(&self, title: Option<&str>, url: Option<&str>) -> Result<Value> {
        if title.is_none() && url.is_none() {
            return Err(PilotError::InvalidArgument(
                "switch_tab needs a title or url".to_string(),
            ));
        }

        let tab = self.matching_tab(title, url).await?;
        let activated = Arc::clone(&tab);
        blocking("switch_tab", move || {
            activated
                .activate()
                .map(|_| ())
                .map_err(|e| classify("activate tab", e))
        })
        .await?;

        let landed = tab.get_url();
        self.set_active(tab);
        Ok(Value::from(format!("Switched to tab {}", landed)))
    }

    async fn list_tabs(&self) -> Result<Vec<ResourceDescriptor>> {
        let tabs = all_tabs(&self.browser);
        blocking("list_tabs", move || Ok(describe_tabs(&tabs))).await
    }

    async fn active_tab(&self) -> Result<ResourceDescriptor> {
        let tabs = all_tabs(&self.browser);
        let active = self.active();
        blocking("active_tab", move || {
            let index = tabs
                .iter()
                .position(|tab| Arc::ptr_eq(tab, &active))
                .map(|i| i + 1)
                .unwrap_or(0);
            Ok(ResourceDescriptor {
                index,
                title: active.get_title().unwrap_or_default(),
                url: active.get_url(),
            })
        })
        .await
    }

    async fn interactive_elements(&self) -> Result<Vec<Affordance>> {
        let tab = self.active();
        let raw = blocking("interactive_elements", move || {
            evaluate(&tab, dom::ENUMERATE_AFFORDANCES)
        })
        .await?;
        let affordances = dom::parse_affordances(&raw)?;
        debug!("Indexed {} interactive elements", affordances.len());
        Ok(affordances)
    }

    async fn remove_highlight(&self) -> Result<()> {
        let tab = self.active();
        blocking("remove_highlight", move || {
            evaluate(&tab, dom::REMOVE_HIGHLIGHT).map(|_| ())
        })
        .await
    }

    async fn count_matches(&self, xpath: &str) -> Result<usize> {
        let tab = self.active();
        let script = dom::count_matches(&normalize_xpath(xpath));
        let count = blocking("count_matches", move || evaluate(&tab, &script)).await?;
        count
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| PilotError::Browser(format!("Unexpected match count {}", count)))
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        debug!("BrowserSession dropped, browser will be cleaned up");
    }
}

/// Run a blocking CDP call on the blocking pool
async fn blocking<T, F>(operation: &'static str, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PilotError::Browser(format!("{} task failed: {}", operation, e)))?
}

fn evaluate(tab: &Tab, script: &str) -> Result<Value> {
    let result = tab
        .evaluate(script, false)
        .map_err(|e| classify("evaluate script", e))?;
    Ok(result.value.unwrap_or(Value::Null))
}

fn navigate(tab: &Tab, url: &str) -> Result<()> {
    tab.navigate_to(url)
        .map_err(|e| classify(&format!("navigate to {}", url), e))?;
    tab.wait_until_navigated()
        .map_err(|e| classify(&format!("load {}", url), e))?;
    Ok(())
}

fn require_http(url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(PilotError::InvalidArgument(format!(
            "URL must start with http:// or https://, got {}",
            url
        )))
    }
}

fn all_tabs(browser: &Browser) -> Vec<Arc<Tab>> {
    lock(&**browser.get_tabs()).clone()
}

fn describe_tabs(tabs: &[Arc<Tab>]) -> Vec<ResourceDescriptor> {
    tabs.iter()
        .enumerate()
        .map(|(i, tab)| ResourceDescriptor {
            index: i + 1,
            title: tab.get_title().unwrap_or_default(),
            url: tab.get_url(),
        })
        .collect()
}

/// Position of the first tab whose title and url contain the given fragments
fn find_tab(tabs: &[ResourceDescriptor], title: Option<&str>, url: Option<&str>) -> Option<usize> {
    if title.is_none() && url.is_none() {
        return None;
    }
    tabs.iter().position(|tab| {
        title.map_or(true, |t| tab.title.contains(t)) && url.map_or(true, |u| tab.url.contains(u))
    })
}

/// Map a driver error onto the error taxonomy by its message
fn classify(context: &str, e: impl Display) -> PilotError {
    let message = format!("{}: {}", context, e);
    let lower = message.to_lowercase();

    if lower.contains("timed out") || lower.contains("timeout") {
        PilotError::Timeout(message)
    } else if lower.contains("no element") || lower.contains("not found") || lower.contains("could not find") {
        PilotError::ElementNotFound(message)
    } else if lower.contains("connection") || lower.contains("websocket") || lower.contains("disconnected") {
        PilotError::Connection(message)
    } else {
        PilotError::Browser(message)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
