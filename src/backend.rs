use anyhow::Result;
use async_trait::async_trait;

use crate::types::DashboardView;

/// The two request/response operations the scan backend exposes. Progress,
/// completion and failure arrive separately on the event channel.
#[async_trait]
pub trait ScanBackend: Send + Sync + 'static {
    /// Kick off a scan. `Some(view)` means the scan finished synchronously;
    /// `None` means completion will be announced with a `scanComplete` event.
    async fn start_scan(&self, concurrency: u32) -> Result<Option<DashboardView>>;

    /// The most recently persisted report, if any.
    async fn last_report(&self) -> Result<Option<DashboardView>>;
}
