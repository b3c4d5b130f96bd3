//! A stand-in backend that replays a saved report as if it were being scanned.
//!
//! Each entry is "scanned" by a task that waits `step_delay`, bounded by a
//! semaphore sized from the requested concurrency, and reports progress on the
//! event channel. When every task is done the report becomes the new
//! `LastReport` and `scanComplete` is emitted.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio::time;
use tracing::{debug, info, trace, warn};

use crate::backend::ScanBackend;
use crate::events::RawEvent;
use crate::types::{DashboardView, HostEntry};

const REPORT_VERSION: u32 = 1;
const MAX_CONCURRENCY: usize = 64;

/// `{ "version": 1, "savedAt": "...", "view": {...} }` as written by the scanner's cache.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportEnvelope {
    version: u32,
    #[serde(default)]
    saved_at: Option<String>,
    view: Option<DashboardView>,
}

/// Parse a report file body: either a bare `DashboardView` or the versioned cache envelope.
pub fn parse_report(s: &str) -> Result<DashboardView> {
    let value: Value = serde_json::from_str(s).context("report is not valid JSON")?;
    if value.get("view").is_some() && value.get("version").is_some() {
        let envelope: ReportEnvelope =
            serde_json::from_value(value).context("invalid report envelope")?;
        if envelope.version != REPORT_VERSION {
            bail!("unsupported report version {}", envelope.version);
        }
        if let Some(saved_at) = envelope.saved_at.as_deref() {
            debug!(saved_at, "report envelope");
        }
        return envelope.view.ok_or_else(|| anyhow!("report envelope has no view"));
    }
    serde_json::from_value(value).context("invalid dashboard view")
}

/// Load a report from disk. A missing file is not an error.
pub fn load_report(path: impl AsRef<Path>) -> Result<Option<DashboardView>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read report: {}", path.display()))?;
    parse_report(&content)
        .with_context(|| format!("failed to parse report: {}", path.display()))
        .map(Some)
}

pub struct ReplayBackend {
    report_path: PathBuf,
    events: mpsc::UnboundedSender<RawEvent>,
    step_delay: Duration,
    scanning: Arc<AtomicBool>,
    last: Arc<RwLock<Option<DashboardView>>>,
}

impl ReplayBackend {
    /// Create the backend, seeding `LastReport` from `report_path` if it exists.
    pub fn open(
        report_path: impl Into<PathBuf>,
        events: mpsc::UnboundedSender<RawEvent>,
        step_delay: Duration,
    ) -> Self {
        let report_path = report_path.into();
        let cached = match load_report(&report_path) {
            Ok(v) => v,
            Err(e) => {
                let message = format!("{e:#}");
                warn!(error = %message, "ignoring unreadable cached report");
                None
            }
        };
        if cached.is_some() {
            info!(path = %report_path.display(), "loaded cached report");
        }
        Self {
            report_path,
            events,
            step_delay,
            scanning: Arc::new(AtomicBool::new(false)),
            last: Arc::new(RwLock::new(cached)),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ScanBackend for ReplayBackend {
    async fn start_scan(&self, concurrency: u32) -> Result<Option<DashboardView>> {
        if self.scanning.swap(true, Ordering::AcqRel) {
            bail!("scan already running");
        }

        let path = self.report_path.clone();
        let events = self.events.clone();
        let step_delay = self.step_delay;
        let scanning = self.scanning.clone();
        let last = self.last.clone();

        tokio::spawn(async move {
            let result = replay_report(&path, concurrency as usize, step_delay, &events).await;
            scanning.store(false, Ordering::Release);
            match result {
                Ok(view) => {
                    let issues = view.total_issues();
                    *last.write().await = Some(view);
                    info!(issues, "replay finished");
                    emit(&events, "scanComplete", json!({ "errorCount": issues }));
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    warn!(error = %message, "replay failed");
                    emit(&events, "scanError", json!({ "message": message }));
                }
            }
        });

        Ok(None)
    }

    async fn last_report(&self) -> Result<Option<DashboardView>> {
        Ok(self.last.read().await.clone())
    }
}

async fn replay_report(
    path: &Path,
    concurrency: usize,
    step_delay: Duration,
    events: &mpsc::UnboundedSender<RawEvent>,
) -> Result<DashboardView> {
    let view = load_report(path)?.ok_or_else(|| anyhow!("no pool targets found"))?;
    let targets: Vec<(String, u16)> = view
        .clean_entries
        .iter()
        .chain(view.issue_entries.iter())
        .map(target_of)
        .collect();
    if targets.is_empty() {
        bail!("no pool targets found");
    }

    let total = targets.len() as u64;
    let done = Arc::new(AtomicU64::new(0));
    let sem = Arc::new(Semaphore::new(concurrency.clamp(1, MAX_CONCURRENCY)));
    let mut set = JoinSet::new();

    for (host, port) in targets {
        let permit = sem
            .clone()
            .acquire_owned()
            .await
            .context("replay semaphore closed")?;
        let done = done.clone();
        let events = events.clone();
        set.spawn(async move {
            let _permit = permit;
            time::sleep(step_delay).await;
            let current = done.fetch_add(1, Ordering::Relaxed) + 1;
            emit(
                &events,
                "scanProgress",
                json!({ "host": host, "port": port, "current": current, "total": total }),
            );
        });
    }

    while let Some(res) = set.join_next().await {
        res.context("replay task panicked")?;
    }
    Ok(view)
}

fn target_of(entry: &HostEntry) -> (String, u16) {
    match entry.latest() {
        Some(latest) if !latest.host.is_empty() => (latest.host.clone(), latest.port),
        _ => (entry.host.host.clone(), 0),
    }
}

fn emit(events: &mpsc::UnboundedSender<RawEvent>, topic: &str, payload: Value) {
    if events.send(RawEvent::new(topic, payload)).is_err() {
        trace!(topic, "event channel closed, dropping");
    }
}
