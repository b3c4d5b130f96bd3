use std::sync::Arc;

use time::{format_description::well_known, OffsetDateTime};
use tokio::sync::watch;
use tracing::debug;

use crate::render;
use crate::types::DashboardView;

/// What readers see: the held view plus the generation that produced it.
///
/// Snapshots are cheap clones of an `Arc`; a reader holding one never observes
/// a later commit.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub view: Option<Arc<DashboardView>>,
    pub generation: u64,
    pub committed_at: Option<String>,
}

impl StoreSnapshot {
    pub fn total_clean(&self) -> usize {
        self.view.as_deref().map_or(0, DashboardView::total_clean)
    }

    pub fn total_issues(&self) -> usize {
        self.view.as_deref().map_or(0, DashboardView::total_issues)
    }

    pub fn summary(&self) -> String {
        match self.view.as_deref() {
            Some(view) => render::summary_text(view.total_clean(), view.total_issues()),
            None => render::NO_DATA_SUMMARY.to_string(),
        }
    }
}

pub type RenderHook = Arc<dyn Fn(&StoreSnapshot) + Send + Sync>;

/// Owner of the canonical `DashboardView`.
///
/// Every commit is a whole-object replace guarded by the scan generation: a
/// commit tagged with an older generation than the one held is refused.
#[derive(Clone)]
pub struct ViewStore {
    tx: Arc<watch::Sender<StoreSnapshot>>,
    on_commit: Option<RenderHook>,
}

impl Default for ViewStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewStore {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(StoreSnapshot::default())),
            on_commit: None,
        }
    }

    /// Install the render pass run after each accepted commit.
    pub fn with_render_hook(mut self, hook: impl Fn(&StoreSnapshot) + Send + Sync + 'static) -> Self {
        self.on_commit = Some(Arc::new(hook));
        self
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.tx.subscribe()
    }

    /// Replace the held view. Returns false (and leaves the store untouched)
    /// when `generation` is older than the generation already held.
    pub fn commit(&self, generation: u64, view: DashboardView) -> bool {
        let view = Arc::new(view);
        let accepted = self.tx.send_if_modified(|held| {
            if generation < held.generation {
                return false;
            }
            *held = StoreSnapshot {
                view: Some(view.clone()),
                generation,
                committed_at: Some(now_rfc3339()),
            };
            true
        });

        if !accepted {
            debug!(generation, held = self.tx.borrow().generation, "refused stale commit");
            return false;
        }

        let snapshot = self.snapshot();
        debug!(
            generation,
            clean = snapshot.total_clean(),
            issues = snapshot.total_issues(),
            "committed view"
        );
        if let Some(hook) = &self.on_commit {
            hook(&snapshot);
        }
        true
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HostEntry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn view(clean: usize, issues: usize) -> DashboardView {
        DashboardView {
            clean_entries: vec![HostEntry::default(); clean],
            issue_entries: vec![HostEntry::default(); issues],
            ..Default::default()
        }
    }

    #[test]
    fn empty_store_has_no_data_summary() {
        let store = ViewStore::new();
        let snap = store.snapshot();
        assert!(snap.view.is_none());
        assert_eq!(snap.summary(), "Last scan: no data");
    }

    #[test]
    fn commit_replaces_view_and_runs_hook() {
        let renders = Arc::new(AtomicUsize::new(0));
        let r = renders.clone();
        let store = ViewStore::new().with_render_hook(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });

        assert!(store.commit(1, view(1, 2)));
        let snap = store.snapshot();
        assert_eq!(snap.total_clean(), 1);
        assert_eq!(snap.total_issues(), 2);
        assert_eq!(snap.summary(), "Last scan: 3 pools (2 issues)");
        assert_eq!(renders.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn older_generation_cannot_overwrite() {
        let store = ViewStore::new();
        assert!(store.commit(2, view(4, 0)));
        let before = store.snapshot();

        assert!(!store.commit(1, view(0, 1)));
        let after = store.snapshot();
        assert_eq!(after.generation, 2);
        assert!(Arc::ptr_eq(
            before.view.as_ref().unwrap(),
            after.view.as_ref().unwrap()
        ));
    }

    #[test]
    fn held_snapshot_is_unaffected_by_later_commit() {
        let store = ViewStore::new();
        store.commit(0, view(2, 0));
        let held = store.snapshot();
        store.commit(1, view(0, 0));
        assert_eq!(held.total_clean(), 2);
        assert_eq!(store.snapshot().total_clean(), 0);
    }
}
