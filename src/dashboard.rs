//! Wiring: readiness gate, event subscription, scan trigger and detail overlay
//! around one shared [`ViewStore`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::ScanBackend;
use crate::bridge::{
    Readiness, RuntimeBridge, RuntimeCheck, DEFAULT_POLL_INTERVAL, DEFAULT_READY_TIMEOUT,
};
use crate::controller::{ScanController, ScanStatus, StartOutcome};
use crate::detail::{DetailPanel, DetailRecord};
use crate::error::DashError;
use crate::events::{EventSubscriber, RawEvent, Topic};
use crate::render::{render_dashboard, RenderedDashboard};
use crate::store::{StoreSnapshot, ViewStore};
use crate::types::ListKey;

pub const RUNTIME_UNAVAILABLE: &str =
    "Backend runtime not available. This build may be incompatible with this host.";
pub const RUNTIME_NOT_READY: &str = "Backend not ready yet (waiting for runtime)";

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Concurrency passed to every scan start.
    pub concurrency: u32,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Everything a page needs to draw itself, in one serializable value.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardState {
    pub readiness: Readiness,
    pub scan_enabled: bool,
    pub status: ScanStatus,
    pub view: RenderedDashboard,
    pub detail: Option<DetailRecord>,
}

type PendingEvents = (mpsc::UnboundedReceiver<RawEvent>, CancellationToken);

pub struct Dashboard<B> {
    bridge: RuntimeBridge,
    controller: Arc<ScanController<B>>,
    detail: Mutex<DetailPanel>,
    pending_events: Mutex<Option<PendingEvents>>,
    pump: Mutex<Option<(JoinHandle<()>, CancellationToken)>>,
    config: DashboardConfig,
}

impl<B: ScanBackend> Dashboard<B> {
    pub fn new(
        backend: Arc<B>,
        check: impl RuntimeCheck + 'static,
        store: ViewStore,
        config: DashboardConfig,
    ) -> Self {
        Self {
            bridge: RuntimeBridge::with_poll_interval(check, config.poll_interval),
            controller: Arc::new(ScanController::new(backend, store)),
            detail: Mutex::new(DetailPanel::new()),
            pending_events: Mutex::new(None),
            pump: Mutex::new(None),
            config,
        }
    }

    pub fn controller(&self) -> &Arc<ScanController<B>> {
        &self.controller
    }

    pub fn store(&self) -> &ViewStore {
        self.controller.store()
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn readiness(&self) -> Readiness {
        self.bridge.state()
    }

    /// Wait for the backend surface, then attach the event channel and load
    /// the cached report. On timeout the channel is parked so a later manual
    /// start can still attach it.
    pub async fn boot(
        &self,
        events: mpsc::UnboundedReceiver<RawEvent>,
        cancel: CancellationToken,
    ) -> Result<(), DashError> {
        *self.pending_events.lock().await = Some((events, cancel));

        if let Err(e) = self.bridge.await_ready(self.config.ready_timeout).await {
            self.controller.report_error(RUNTIME_UNAVAILABLE);
            return Err(e);
        }

        self.attach_events().await;
        self.controller.report("Ready");
        self.controller.load_last_report().await;
        Ok(())
    }

    /// Register the three topic handlers and start draining the channel.
    /// Does nothing if already attached or nothing is parked.
    async fn attach_events(&self) {
        let Some((rx, cancel)) = self.pending_events.lock().await.take() else {
            return;
        };

        let mut subscriber = EventSubscriber::new();
        for topic in [Topic::ScanProgress, Topic::ScanComplete, Topic::ScanError] {
            let controller = self.controller.clone();
            subscriber.subscribe(topic, move |event| {
                let controller = controller.clone();
                async move { controller.handle_event(event).await }
            });
        }

        let stop = cancel.clone();
        let handle = tokio::spawn(subscriber.run(rx, cancel));
        *self.pump.lock().await = Some((handle, stop));
        info!("event handlers attached");
    }

    /// The "start scan" trigger. Returns `None` when the backend surface is
    /// still not callable; the status line says so and nothing else happens.
    pub async fn start_scan(&self) -> Option<StartOutcome> {
        if !self.bridge.is_ready() {
            self.controller.report_error(RUNTIME_NOT_READY);
            return None;
        }
        self.attach_events().await;
        Some(self.controller.start(self.config.concurrency).await)
    }

    pub fn status(&self) -> ScanStatus {
        self.controller.status()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store().snapshot()
    }

    pub fn rendered(&self) -> RenderedDashboard {
        render_dashboard(&self.snapshot())
    }

    /// Row activation (click, Enter or Space) carrying the row's index attribute.
    pub async fn open_detail(&self, list: ListKey, raw_index: &str) -> Option<DetailRecord> {
        let snapshot = self.snapshot();
        let mut panel = self.detail.lock().await;
        match panel.open_from_attr(&snapshot, list, raw_index) {
            Ok(record) => Some(record.clone()),
            Err(e) => {
                debug!(error = %e, "detail request ignored");
                None
            }
        }
    }

    /// Close button, overlay background click and Escape all end up here.
    pub async fn close_detail(&self) {
        self.detail.lock().await.close();
    }

    pub async fn detail(&self) -> Option<DetailRecord> {
        self.detail.lock().await.current().cloned()
    }

    /// URL for the overlay's "Open details" action, when the entry has one.
    pub async fn detail_action_url(&self) -> Option<String> {
        self.detail
            .lock()
            .await
            .current()
            .and_then(|r| r.external_url().map(str::to_string))
    }

    pub async fn state(&self) -> DashboardState {
        let status = self.status();
        DashboardState {
            readiness: self.readiness(),
            scan_enabled: status.scan_enabled(),
            status,
            view: self.rendered(),
            detail: self.detail().await,
        }
    }

    /// Stop the event pump (or drop the parked channel) and wait for it.
    pub async fn shutdown(&self) {
        if let Some((_, cancel)) = self.pending_events.lock().await.take() {
            cancel.cancel();
        }
        if let Some((handle, stop)) = self.pump.lock().await.take() {
            stop.cancel();
            if let Err(e) = handle.await {
                debug!(error = %e, "event pump ended abnormally");
            }
        }
    }
}
