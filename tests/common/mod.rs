#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::oneshot;

use pool_census_dash::backend::ScanBackend;
use pool_census_dash::types::{DashboardView, EntryView, HostEntry, HostView};

type Gate = (oneshot::Sender<()>, oneshot::Receiver<()>);

/// Backend whose answers are queued up by the test.
#[derive(Default)]
pub struct ScriptedBackend {
    pub starts: AtomicUsize,
    pub fetches: AtomicUsize,
    start_results: Mutex<VecDeque<Result<Option<DashboardView>>>>,
    report: Mutex<Option<DashboardView>>,
    fail_fetch: AtomicBool,
    fetch_gate: Mutex<Option<Gate>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_start(&self, result: Result<Option<DashboardView>>) {
        self.start_results.lock().unwrap().push_back(result);
    }

    pub fn set_report(&self, view: Option<DashboardView>) {
        *self.report.lock().unwrap() = view;
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Hold the next `last_report` call. The first receiver fires once the
    /// call is parked; sending on the returned sender lets it finish with the
    /// report that was current when it started.
    pub fn gate_next_fetch(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.fetch_gate.lock().unwrap() = Some((entered_tx, release_rx));
        (entered_rx, release_tx)
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScanBackend for ScriptedBackend {
    async fn start_scan(&self, _concurrency: u32) -> Result<Option<DashboardView>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.start_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(None))
    }

    async fn last_report(&self) -> Result<Option<DashboardView>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        // The answer is fixed when the call starts; a gated call returns it late.
        let answer = if self.fail_fetch.load(Ordering::SeqCst) {
            Err(anyhow!("transport closed"))
        } else {
            Ok(self.report.lock().unwrap().clone())
        };
        let gate = self.fetch_gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.await;
        }
        answer
    }
}

pub fn entry(pool: &str, bad: bool) -> HostEntry {
    HostEntry {
        pool_name: pool.to_string(),
        host: HostView {
            host: format!("{}.example", pool.to_lowercase()),
            latest: Some(EntryView {
                host: format!("{}.example", pool.to_lowercase()),
                port: 3333,
                ping: Some("12 ms".into()),
                total_payout: Some(3.125),
                connected: true,
                panel_class: if bad { "panel-bad".into() } else { "panel-good".into() },
                scan_url: "#".into(),
                ..Default::default()
            }),
        },
        log_file: String::new(),
    }
}

pub fn view(clean: &[&str], issues: &[&str]) -> DashboardView {
    DashboardView {
        clean_entries: clean.iter().map(|p| entry(p, false)).collect(),
        issue_entries: issues.iter().map(|p| entry(p, true)).collect(),
        sort_by: "ping".into(),
        host_filter: String::new(),
    }
}

pub fn pool_names(view: &DashboardView) -> Vec<String> {
    view.clean_entries
        .iter()
        .chain(view.issue_entries.iter())
        .map(|e| e.pool_name.clone())
        .collect()
}
