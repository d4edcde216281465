//! The environment driver contract
//!
//! Every action returns a descriptive success value or an error. The three
//! read-only methods at the bottom feed the snapshot producer and the
//! planner's locator check.

use async_trait::async_trait;
use pilot_core::{Affordance, ResourceDescriptor, Result};
use serde_json::Value;

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn click_element(&self, xpath: &str) -> Result<Value>;

    /// Attach files to the file input at (or after) `xpath`
    async fn click_to_upload(&self, xpath: &str, file_paths: &[String]) -> Result<Value>;

    /// Clear the field, type `text` and press Enter
    async fn input_text(&self, xpath: &str, text: &str) -> Result<Value>;

    async fn send_keys(&self, xpath: &str, keys: &str) -> Result<Value>;

    async fn scroll_down(&self, pixel: i64) -> Result<Value>;

    async fn scroll_up(&self, pixel: i64) -> Result<Value>;

    async fn go_to_url(&self, url: &str) -> Result<Value>;

    async fn open_tab(&self, url: &str) -> Result<Value>;

    async fn go_back(&self) -> Result<Value>;

    /// Close the tab matching `title`/`url`, or the active tab when both are absent
    async fn close_tab(&self, title: Option<&str>, url: Option<&str>) -> Result<Value>;

    async fn switch_tab(&self, title: Option<&str>, url: Option<&str>) -> Result<Value>;

    /// Open tabs in browser order
    async fn list_tabs(&self) -> Result<Vec<ResourceDescriptor>>;

    async fn active_tab(&self) -> Result<ResourceDescriptor>;

    /// Index and outline the interactive elements of the active page
    ///
    /// Leaves visual markers behind; callers must follow up with
    /// [`BrowserDriver::remove_highlight`].
    async fn interactive_elements(&self) -> Result<Vec<Affordance>>;

    async fn remove_highlight(&self) -> Result<()>;

    /// Number of elements an XPath currently resolves to on the active page
    async fn count_matches(&self, xpath: &str) -> Result<usize>;
}
