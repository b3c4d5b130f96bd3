//! Scan lifecycle: start, progress, completion and failure, guarded by a
//! generation counter so results from a superseded scan never land.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::backend::ScanBackend;
use crate::error::DashError;
use crate::events::{CompletionEvent, ErrorEvent, ProgressEvent, ScanEvent};
use crate::render::progress_percent;
use crate::store::ViewStore;
use crate::types::DashboardView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "generation", rename_all = "snake_case")]
pub enum ScanPhase {
    Idle,
    InFlight(u64),
}

/// Everything the trigger, status line and progress bar display.
#[derive(Debug, Clone, Serialize)]
pub struct ScanStatus {
    pub phase: ScanPhase,
    /// Latest generation handed out by `start`.
    pub generation: u64,
    /// Highest generation whose outcome (view, error or nothing) has been applied.
    pub settled: u64,
    pub status_text: String,
    pub progress_label: String,
    pub progress_percent: u32,
    pub progress: Option<ProgressEvent>,
    pub last_error: Option<String>,
}

impl Default for ScanStatus {
    fn default() -> Self {
        Self {
            phase: ScanPhase::Idle,
            generation: 0,
            settled: 0,
            status_text: "Idle".into(),
            progress_label: "Waiting to scan...".into(),
            progress_percent: 0,
            progress: None,
            last_error: None,
        }
    }
}

impl ScanStatus {
    pub fn scan_enabled(&self) -> bool {
        self.phase == ScanPhase::Idle
    }

    fn show_error(&mut self, message: &str) {
        self.status_text = message.to_string();
        self.progress_label = message.to_string();
        self.last_error = Some(message.to_string());
    }

    fn show_completion(&mut self, issues: u64) {
        self.progress_label = format!("Completed with {issues} issue(s)");
        self.status_text = if issues > 0 {
            "Finished with issues".into()
        } else {
            "Scan complete".into()
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "generation", rename_all = "snake_case")]
pub enum StartOutcome {
    /// Another scan was already in flight; nothing was sent to the backend.
    Ignored { in_flight: u64 },
    /// The backend accepted the scan; completion will arrive as an event.
    Pending(u64),
    /// The backend answered with a finished view.
    Completed(u64),
    /// The backend rejected the start.
    Failed(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    /// Only a scan that is still in flight can be resolved.
    InFlightOnly,
    /// Also accept the latest generation once it has settled.
    AcceptSettled,
}

pub struct ScanController<B> {
    backend: Arc<B>,
    store: ViewStore,
    status: watch::Sender<ScanStatus>,
}

impl<B: ScanBackend> ScanController<B> {
    pub fn new(backend: Arc<B>, store: ViewStore) -> Self {
        Self {
            backend,
            store,
            status: watch::Sender::new(ScanStatus::default()),
        }
    }

    pub fn status(&self) -> ScanStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScanStatus> {
        self.status.subscribe()
    }

    pub fn store(&self) -> &ViewStore {
        &self.store
    }

    /// Replace the status line without touching the lifecycle (readiness
    /// messages). Does nothing while a scan is in flight.
    pub fn report(&self, message: &str) {
        self.status.send_if_modified(|s| {
            if s.phase != ScanPhase::Idle {
                return false;
            }
            s.status_text = message.to_string();
            true
        });
    }

    /// Same as [`report`](Self::report) but also shown as an error in the progress area.
    pub fn report_error(&self, message: &str) {
        self.status.send_modify(|s| s.show_error(message));
    }

    /// Seed the store from the backend's cached report. Empty or missing
    /// reports are ignored; transport failures are logged and swallowed.
    ///
    /// The cached report is committed at generation 0, so anything a scan has
    /// already committed wins over it.
    pub async fn load_last_report(&self) -> bool {
        match self.backend.last_report().await {
            Ok(Some(view)) if !view.is_empty() => {
                let committed = self.store.commit(0, view);
                if committed {
                    self.report("Last scan loaded");
                } else {
                    debug!("cached report superseded by a scan result");
                }
                committed
            }
            Ok(_) => {
                debug!("no cached report");
                false
            }
            Err(err) => {
                warn!(error = %DashError::backend("LastReport", &err), "failed to read last report");
                false
            }
        }
    }

    pub async fn start(&self, concurrency: u32) -> StartOutcome {
        let mut admitted = Err(0);
        self.status.send_if_modified(|s| match s.phase {
            ScanPhase::InFlight(g) => {
                admitted = Err(g);
                false
            }
            ScanPhase::Idle => {
                s.generation += 1;
                s.phase = ScanPhase::InFlight(s.generation);
                s.status_text = "Initializing...".into();
                s.progress_label = "Starting scan…".into();
                s.progress_percent = 0;
                s.progress = None;
                s.last_error = None;
                admitted = Ok(s.generation);
                true
            }
        });

        let generation = match admitted {
            Ok(g) => g,
            Err(in_flight) => {
                debug!(in_flight, "start ignored, scan already in flight");
                return StartOutcome::Ignored { in_flight };
            }
        };

        info!(generation, concurrency, "starting scan");
        match self.backend.start_scan(concurrency).await {
            Ok(Some(view)) if !view.is_empty() => {
                self.complete_with_view(generation, view);
                StartOutcome::Completed(generation)
            }
            Ok(_) => {
                debug!(generation, "scan accepted, awaiting completion event");
                StartOutcome::Pending(generation)
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(generation, error = %DashError::backend("StartScan", &err), "scan start rejected");
                let resolved = self.resolve(Some(generation), Resolution::InFlightOnly, |s| {
                    s.progress_label = "Scan failed".into();
                    s.status_text = format!("Error: {message}");
                    s.last_error = Some(message.clone());
                });
                if resolved.is_ok() {
                    self.settle(generation);
                }
                StartOutcome::Failed(generation)
            }
        }
    }

    pub async fn handle_event(&self, event: ScanEvent) {
        match event {
            ScanEvent::Progress(p) => self.on_progress(p),
            ScanEvent::Complete(c) => self.on_complete(c).await,
            ScanEvent::Error(e) => self.on_error(e),
        }
    }

    pub fn on_progress(&self, progress: ProgressEvent) {
        self.status.send_if_modified(|s| {
            if s.phase == ScanPhase::Idle {
                trace!(host = %progress.host, "progress outside a scan, dropped");
                return false;
            }
            s.progress_percent = progress_percent(progress.current, progress.total);
            s.progress_label = format!(
                "Scanning {}:{} ({}/{})",
                progress.host, progress.port, progress.current, progress.total
            );
            s.status_text = "Scanning pools...".into();
            s.progress = Some(progress);
            true
        });
    }

    /// Completion is only a signal: the canonical report is re-fetched and
    /// committed under the generation that was in flight.
    ///
    /// A backend that answered `StartScan` with its cached view still finishes
    /// the real scan later; that completion lands on the settled generation
    /// and replaces the cached view with the fresh report.
    pub async fn on_complete(&self, event: CompletionEvent) {
        let resolved = self.resolve(event.generation, Resolution::AcceptSettled, |s| {
            s.show_completion(event.error_count)
        });
        let generation = match resolved {
            Ok(g) => g,
            Err(e) => {
                debug!(error = %e, "discarding completion");
                return;
            }
        };

        match self.backend.last_report().await {
            Ok(Some(view)) => {
                if !self.store.commit(generation, view) {
                    debug!(generation, "newer view already held, completion result dropped");
                }
            }
            Ok(None) => debug!(generation, "completion without a report"),
            Err(err) => {
                warn!(generation, error = %DashError::backend("LastReport", &err), "failed to refresh report")
            }
        }
        self.settle(generation);
    }

    pub fn on_error(&self, event: ErrorEvent) {
        match self.resolve(event.generation, Resolution::AcceptSettled, |s| {
            s.show_error(&event.message)
        }) {
            Ok(generation) => {
                warn!(generation, message = %event.message, "scan failed");
                self.settle(generation);
            }
            Err(e) => debug!(error = %e, "discarding scan error"),
        }
    }

    fn complete_with_view(&self, generation: u64, view: DashboardView) {
        let issues = view.total_issues() as u64;
        match self.resolve(Some(generation), Resolution::InFlightOnly, |s| {
            s.show_completion(issues)
        }) {
            Ok(_) => {
                self.store.commit(generation, view);
                self.settle(generation);
                debug!(generation, "start returned a view, a completion event may still refresh it");
            }
            // A completion event got there first and owns the commit.
            Err(e) => debug!(error = %e, "immediate view arrived after completion"),
        }
    }

    /// Move `InFlight(target)` to `Idle`, applying `apply` in the same update.
    /// `target` defaults to the current generation when the event carries none.
    ///
    /// With [`Resolution::AcceptSettled`] an event for the latest generation is
    /// also applied after that generation already settled from the start
    /// response, as long as no newer start has happened since.
    fn resolve(
        &self,
        target: Option<u64>,
        mode: Resolution,
        apply: impl FnOnce(&mut ScanStatus),
    ) -> Result<u64, DashError> {
        let mut outcome = Ok(0);
        self.status.send_if_modified(|s| {
            let current = s.generation;
            let target = target.unwrap_or(current);
            match s.phase {
                ScanPhase::InFlight(g) if g == target => {
                    s.phase = ScanPhase::Idle;
                }
                ScanPhase::Idle
                    if mode == Resolution::AcceptSettled
                        && target > 0
                        && target == current
                        && s.settled == current =>
                {
                    trace!(generation = target, "event for an already settled scan");
                }
                _ => {
                    outcome = Err(DashError::StaleCompletion {
                        event_generation: target,
                        current,
                    });
                    return false;
                }
            }
            apply(s);
            outcome = Ok(target);
            true
        });
        outcome
    }

    fn settle(&self, generation: u64) {
        self.status.send_if_modified(|s| {
            if generation <= s.settled {
                return false;
            }
            s.settled = generation;
            true
        });
    }
}
