//! Repetition guard applied to a driver
//!
//! Navigation, tab management and element interactions are guarded. Scrolls
//! and key presses pass straight through so the planner's idle scroll can
//! never be refused.

use crate::driver::BrowserDriver;
use async_trait::async_trait;
use pilot_core::{Affordance, CallRepetitionGuard, Guarded, ResourceDescriptor, Result};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;

/// A driver whose state-changing operations go through a [`CallRepetitionGuard`]
pub struct GuardedDriver<D> {
    inner: Arc<D>,
    guard: CallRepetitionGuard,
}

impl<D: BrowserDriver> GuardedDriver<D> {
    pub fn new(inner: Arc<D>, guard: CallRepetitionGuard) -> Self {
        Self { inner, guard }
    }

    pub fn inner(&self) -> &Arc<D> {
        &self.inner
    }

    pub fn guard(&self) -> &CallRepetitionGuard {
        &self.guard
    }

    async fn guarded<F, Fut>(&self, name: &str, args: Value, op: F) -> Result<Value>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Value>> + Send,
    {
        self.guard
            .invoke(name, args, op)
            .await
            .map(Guarded::into_output)
    }
}

#[async_trait]
impl<D: BrowserDriver> BrowserDriver for GuardedDriver<D> {
    async fn click_element(&self, xpath: &str) -> Result<Value> {
        self.guarded("click_element", json!({ "xpath": xpath }), || {
            self.inner.click_element(xpath)
        })
        .await
    }

    async fn click_to_upload(&self, xpath: &str, file_paths: &[String]) -> Result<Value> {
        self.guarded(
            "click_to_upload",
            json!({ "xpath": xpath, "file_paths": file_paths }),
            || self.inner.click_to_upload(xpath, file_paths),
        )
        .await
    }

    async fn input_text(&self, xpath: &str, text: &str) -> Result<Value> {
        self.guarded(
            "input_text",
            json!({ "xpath": xpath, "text": text }),
            || self.inner.input_text(xpath, text),
        )
        .await
    }

    async fn send_keys(&self, xpath: &str, keys: &str) -> Result<Value> {
        self.inner.send_keys(xpath, keys).await
    }

    async fn scroll_down(&self, pixel: i64) -> Result<Value> {
        self.inner.scroll_down(pixel).await
    }

    async fn scroll_up(&self, pixel: i64) -> Result<Value> {
        self.inner.scroll_up(pixel).await
    }

    async fn go_to_url(&self, url: &str) -> Result<Value> {
        self.guarded("go_to_url", json!({ "url": url }), || self.inner.go_to_url(url))
            .await
    }

    async fn open_tab(&self, url: &str) -> Result<Value> {
        self.guarded("open_tab", json!({ "url": url }), || self.inner.open_tab(url))
            .await
    }

    async fn go_back(&self) -> Result<Value> {
        self.guarded("go_back", json!({}), || self.inner.go_back())
            .await
    }

    async fn close_tab(&self, title: Option<&str>, url: Option<&str>) -> Result<Value> {
        self.guarded(
            "close_tab",
            json!({ "title": title, "url": url }),
            || self.inner.close_tab(title, url),
        )
        .await
    }

    async fn switch_tab(&self, title: Option<&str>, url: Option<&str>) -> Result<Value> {
        self.inner.switch_tab(title, url).await
    }

    async fn list_tabs(&self) -> Result<Vec<ResourceDescriptor>> {
        self.inner.list_tabs().await
    }

    async fn active_tab(&self) -> Result<ResourceDescriptor> {
        self.inner.active_tab().await
    }

    async fn interactive_elements(&self) -> Result<Vec<Affordance>> {
        self.inner.interactive_elements().await
    }

    async fn remove_highlight(&self) -> Result<()> {
        self.inner.remove_highlight().await
    }

    async fn count_matches(&self, xpath: &str) -> Result<usize> {
        self.inner.count_matches(xpath).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBrowser;
    use pilot_core::PilotError;
    use std::time::Duration;

    fn guarded_mock() -> (Arc<MockBrowser>, GuardedDriver<MockBrowser>) {
        let mock = Arc::new(MockBrowser::new());
        let driver = GuardedDriver::new(
            Arc::clone(&mock),
            CallRepetitionGuard::new(15, Duration::from_secs(30), 3),
        );
        (mock, driver)
    }

    #[tokio::test]
    async fn test_repeated_navigation_is_refused() {
        let (mock, driver) = guarded_mock();

        driver.go_to_url("https://example.com").await.unwrap();
        driver.go_to_url("https://example.com").await.unwrap();
        let warned = driver.go_to_url("https://example.com").await.unwrap();
        let blocked = driver.go_to_url("https://example.com").await;

        assert!(warned.as_str().unwrap().contains("3 times"));
        assert!(matches!(blocked, Err(PilotError::RepeatedCall { .. })));
        assert_eq!(mock.calls_to("go_to_url"), 3);
    }

    #[tokio::test]
    async fn test_scrolls_are_never_refused() {
        let (mock, driver) = guarded_mock();
        for _ in 0..6 {
            driver.scroll_down(300).await.unwrap();
        }
        assert_eq!(mock.calls_to("scroll_down"), 6);
        assert_eq!(driver.guard().recorded_calls(), 0);
    }
}
