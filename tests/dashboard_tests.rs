mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{pool_names, view, ScriptedBackend};
use pool_census_dash::bridge::Readiness;
use pool_census_dash::controller::{ScanStatus, StartOutcome};
use pool_census_dash::dashboard::{
    Dashboard, DashboardConfig, RUNTIME_NOT_READY, RUNTIME_UNAVAILABLE,
};
use pool_census_dash::error::DashError;
use pool_census_dash::events::RawEvent;
use pool_census_dash::replay::ReplayBackend;
use pool_census_dash::store::ViewStore;
use pool_census_dash::types::ListKey;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn config() -> DashboardConfig {
    DashboardConfig {
        concurrency: 2,
        ready_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(10),
    }
}

async fn wait_status<B>(dash: &Dashboard<B>, pred: impl FnMut(&ScanStatus) -> bool) -> ScanStatus
where
    B: pool_census_dash::backend::ScanBackend,
{
    let mut rx = dash.controller().subscribe();
    let status = timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("status never reached")
        .expect("status channel closed");
    status.clone()
}

#[tokio::test]
async fn events_drive_progress_and_completion() {
    let backend = Arc::new(ScriptedBackend::new());
    let dash = Dashboard::new(backend.clone(), || true, ViewStore::new(), config());
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    dash.boot(rx, cancel.clone()).await.unwrap();
    assert_eq!(dash.readiness(), Readiness::Ready);
    assert_eq!(dash.status().status_text, "Ready");

    assert_eq!(dash.start_scan().await, Some(StartOutcome::Pending(1)));
    assert!(!dash.state().await.scan_enabled);

    tx.send(RawEvent::new(
        "scanProgress",
        json!({"Host": "a.example", "Port": 3333, "Current": 1, "Total": 2}),
    ))
    .unwrap();
    let status = wait_status(&dash, |s| s.progress_percent == 50).await;
    assert_eq!(status.progress_label, "Scanning a.example:3333 (1/2)");

    // Lower-case schema from the same stream.
    tx.send(RawEvent::new(
        "scanProgress",
        json!({"host": "b.example", "port": 4444, "current": 2, "total": 2}),
    ))
    .unwrap();
    wait_status(&dash, |s| s.progress_percent == 100).await;

    backend.set_report(Some(view(&["A"], &["B"])));
    tx.send(RawEvent::new("scanComplete", json!({"errorCount": 1})))
        .unwrap();
    let status = wait_status(&dash, |s| s.settled >= 1).await;
    assert!(status.scan_enabled());
    assert_eq!(status.status_text, "Finished with issues");
    assert_eq!(dash.snapshot().summary(), "Last scan: 2 pools (1 issue)");

    cancel.cancel();
    dash.shutdown().await;
}

#[tokio::test]
async fn malformed_events_do_not_stall_the_pump() {
    let backend = Arc::new(ScriptedBackend::new());
    let dash = Dashboard::new(backend, || true, ViewStore::new(), config());
    let (tx, rx) = mpsc::unbounded_channel();
    dash.boot(rx, CancellationToken::new()).await.unwrap();
    dash.start_scan().await;

    tx.send(RawEvent::new("scanProgress", json!(null))).unwrap();
    tx.send(RawEvent::new("scanComplete", json!("done"))).unwrap();
    tx.send(RawEvent::new("somethingElse", json!({}))).unwrap();
    tx.send(RawEvent::new("scanError", json!({}))).unwrap();

    let status = wait_status(&dash, |s| s.settled >= 1).await;
    assert!(status.scan_enabled());
    assert_eq!(status.status_text, "Scan failed");
    assert!(dash.snapshot().view.is_none());

    dash.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn readiness_timeout_then_manual_retry() {
    let backend = Arc::new(ScriptedBackend::new());
    let available = Arc::new(AtomicBool::new(false));
    let ready_check = {
        let available = available.clone();
        move || available.load(Ordering::SeqCst)
    };
    let dash = Dashboard::new(backend.clone(), ready_check, ViewStore::new(), config());
    let (tx, rx) = mpsc::unbounded_channel();

    let err = dash.boot(rx, CancellationToken::new()).await.unwrap_err();
    assert!(
        matches!(err, DashError::ReadinessTimeout { waited_ms } if waited_ms >= 200),
        "unexpected error: {err}"
    );
    assert_eq!(dash.readiness(), Readiness::Unavailable);
    assert_eq!(dash.status().status_text, RUNTIME_UNAVAILABLE);

    assert_eq!(dash.start_scan().await, None);
    assert_eq!(dash.status().status_text, RUNTIME_NOT_READY);
    assert_eq!(backend.start_count(), 0);

    // The surface shows up late; the next click goes through and the parked
    // event channel gets attached.
    available.store(true, Ordering::SeqCst);
    assert_eq!(dash.start_scan().await, Some(StartOutcome::Pending(1)));
    assert_eq!(dash.readiness(), Readiness::Ready);

    tx.send(RawEvent::new("scanError", json!({"message": "no pool targets found"})))
        .unwrap();
    let status = wait_status(&dash, |s| s.settled >= 1).await;
    assert_eq!(status.status_text, "no pool targets found");

    dash.shutdown().await;
}

#[tokio::test]
async fn boot_loads_cached_report() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.set_report(Some(view(&["A", "B"], &[])));
    let dash = Dashboard::new(backend, || true, ViewStore::new(), config());
    let (_tx, rx) = mpsc::unbounded_channel();

    dash.boot(rx, CancellationToken::new()).await.unwrap();
    assert_eq!(dash.status().status_text, "Last scan loaded");
    let rendered = dash.rendered();
    assert_eq!(rendered.clean_count, 2);
    assert_eq!(rendered.summary, "Last scan: 2 pools (0 issues)");

    dash.shutdown().await;
}

#[tokio::test]
async fn scan_started_before_boot_keeps_its_result() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.set_report(Some(view(&["Cached"], &[])));
    let dash = Arc::new(Dashboard::new(backend.clone(), || true, ViewStore::new(), config()));
    assert_eq!(dash.start_scan().await, Some(StartOutcome::Pending(1)));

    let (entered, release) = backend.gate_next_fetch();
    let (tx, rx) = mpsc::unbounded_channel();
    let booting = dash.clone();
    let boot = tokio::spawn(async move { booting.boot(rx, CancellationToken::new()).await });
    entered.await.unwrap();
    assert_eq!(dash.status().status_text, "Initializing...");

    backend.set_report(Some(view(&["Fresh"], &[])));
    tx.send(RawEvent::new("scanComplete", json!({"errorCount": 0})))
        .unwrap();
    wait_status(&dash, |s| s.settled >= 1).await;
    assert_eq!(pool_names(dash.snapshot().view.as_deref().unwrap()), vec!["Fresh"]);

    // The cached report fetched at boot arrives after the scan committed.
    release.send(()).unwrap();
    boot.await.unwrap().unwrap();

    let snap = dash.snapshot();
    assert_eq!(snap.generation, 1);
    assert_eq!(pool_names(snap.view.as_deref().unwrap()), vec!["Fresh"]);
    assert_eq!(dash.status().status_text, "Scan complete");

    dash.shutdown().await;
}

#[tokio::test]
async fn detail_open_close_and_stale_index() {
    let backend = Arc::new(ScriptedBackend::new());
    let store = ViewStore::new();
    let dash = Dashboard::new(backend, || true, store.clone(), config());

    store.commit(1, view(&["A", "B"], &["C"]));

    assert!(dash.open_detail(ListKey::Clean, "5").await.is_none());
    assert!(dash.open_detail(ListKey::Clean, "abc").await.is_none());
    assert!(dash.detail().await.is_none());

    let record = dash.open_detail(ListKey::Issues, "0").await.unwrap();
    assert_eq!(record.list, ListKey::Issues);
    assert_eq!(dash.detail().await.unwrap().title, record.title);
    assert!(dash.state().await.detail.is_some());

    dash.close_detail().await;
    assert!(dash.detail().await.is_none());

    // A row rendered before the list shrank.
    store.commit(2, view(&["A"], &[]));
    assert!(dash.open_detail(ListKey::Clean, "1").await.is_none());
    assert!(dash.detail().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn replay_backend_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("last_report.json");
    std::fs::write(
        &path,
        serde_json::to_string(&view(&["A", "B"], &["C"])).unwrap(),
    )
    .unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let backend = Arc::new(ReplayBackend::open(&path, tx, Duration::from_millis(20)));
    let dash = Dashboard::new(backend.clone(), || true, ViewStore::new(), config());
    dash.boot(rx, CancellationToken::new()).await.unwrap();
    assert_eq!(dash.status().status_text, "Last scan loaded");
    let loaded_generation = dash.snapshot().generation;

    assert_eq!(dash.start_scan().await, Some(StartOutcome::Pending(1)));
    assert!(backend.is_scanning());
    assert_eq!(
        dash.start_scan().await,
        Some(StartOutcome::Ignored { in_flight: 1 })
    );

    let status = wait_status(&dash, |s| s.settled >= 1).await;
    assert_eq!(status.progress_percent, 100);
    assert_eq!(status.progress_label, "Completed with 1 issue(s)");
    assert_eq!(status.status_text, "Finished with issues");

    let snap = dash.snapshot();
    assert!(snap.generation > loaded_generation);
    assert_eq!(snap.summary(), "Last scan: 3 pools (1 issue)");

    dash.shutdown().await;
}
