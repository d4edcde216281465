//! Environment snapshot producer

use crate::driver::BrowserDriver;
use pilot_core::{EnvironmentSnapshot, PilotError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Captures a fresh [`EnvironmentSnapshot`] from a driver
///
/// Highlights set while indexing elements are always removed before
/// returning, whether or not the capture succeeded. Failures surface as
/// `EnvironmentUnavailable`; retrying is left to the caller.
pub struct SnapshotProducer<D> {
    driver: Arc<D>,
    /// How long highlights stay visible before they are cleared
    settle: Duration,
}

impl<D: BrowserDriver> SnapshotProducer<D> {
    pub fn new(driver: Arc<D>, settle: Duration) -> Self {
        Self { driver, settle }
    }

    pub async fn snapshot(&self) -> Result<EnvironmentSnapshot> {
        let captured = self.capture().await;

        if let Err(e) = self.driver.remove_highlight().await {
            warn!("Failed to clear element highlights: {}", e);
        }

        let snapshot = captured.map_err(unavailable)?;
        debug!(
            "Snapshot: {} tabs, {} interactive elements, active {}",
            snapshot.open_resources.len(),
            snapshot.interactive_affordances.len(),
            snapshot.active_resource.url
        );
        Ok(snapshot)
    }

    async fn capture(&self) -> Result<EnvironmentSnapshot> {
        let interactive_affordances = self.driver.interactive_elements().await?;
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
        let open_resources = self.driver.list_tabs().await?;
        let active_resource = self.driver.active_tab().await?;

        Ok(EnvironmentSnapshot {
            open_resources,
            active_resource,
            interactive_affordances,
        })
    }
}

fn unavailable(e: PilotError) -> PilotError {
    match e {
        PilotError::EnvironmentUnavailable(_) => e,
        other => PilotError::EnvironmentUnavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBrowser;

    #[tokio::test]
    async fn test_snapshot_clears_highlights() {
        let mock = Arc::new(MockBrowser::new());
        let producer = SnapshotProducer::new(Arc::clone(&mock), Duration::ZERO);

        let snapshot = producer.snapshot().await.unwrap();

        assert_eq!(snapshot.open_resources.len(), 1);
        assert_eq!(snapshot.active_resource.url, "https://example.com/");
        assert_eq!(snapshot.interactive_affordances.len(), 2);
        assert!(!mock.is_highlighted());
    }

    #[tokio::test]
    async fn test_unreachable_driver_is_environment_unavailable() {
        let mock = Arc::new(MockBrowser::new());
        mock.set_unavailable(true);
        let producer = SnapshotProducer::new(Arc::clone(&mock), Duration::ZERO);

        let result = producer.snapshot().await;

        assert!(matches!(result, Err(PilotError::EnvironmentUnavailable(_))));
        assert_eq!(mock.calls_to("remove_highlight"), 1);
    }
}
