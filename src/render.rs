//! Pure mapping from the held view to markup fragments.
//!
//! Nothing here touches shared state; every string that originated outside this
//! crate goes through [`escape`] before it is interpolated.

use std::borrow::Cow;

use serde::Serialize;

use crate::store::StoreSnapshot;
use crate::types::{EntryView, HostEntry, ListKey};

pub const NO_DATA_SUMMARY: &str = "Last scan: no data";
pub const PANEL_BAD: &str = "panel-bad";
const UNKNOWN_HOST: &str = "unknown";
const NO_PING: &str = "n/a";
const META_SEPARATOR: &str = " · ";

/// HTML-escape `&`, `<`, `>`, `"` and `'`.
pub fn escape(value: &str) -> Cow<'_, str> {
    html_escape::encode_quoted_attribute(value)
}

/// Whole-number percent for the progress bar; zero when the total is unknown.
pub fn progress_percent(current: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    ((current as f64 / total as f64) * 100.0).round() as u32
}

pub fn summary_text(total_clean: usize, total_issues: usize) -> String {
    let plural = if total_issues == 1 { "" } else { "s" };
    format!(
        "Last scan: {} pools ({} issue{})",
        total_clean + total_issues,
        total_issues,
        plural
    )
}

/// `Latest.Host:Latest.Port`, then `Host.Host`, then `unknown`.
pub fn host_label(entry: &HostEntry) -> String {
    match entry.latest() {
        Some(latest) if !latest.host.is_empty() => format!("{}:{}", latest.host, latest.port),
        _ if !entry.host.host.is_empty() => entry.host.host.clone(),
        _ => UNKNOWN_HOST.to_string(),
    }
}

pub fn badge_class(entry: &HostEntry) -> &'static str {
    match entry.latest() {
        Some(latest) if latest.panel_class == PANEL_BAD => "issue",
        _ => "good",
    }
}

pub fn ping_text(latest: Option<&EntryView>) -> &str {
    latest
        .and_then(|l| l.ping.as_deref())
        .filter(|p| !p.is_empty())
        .unwrap_or(NO_PING)
}

pub fn meta_line(entry: &HostEntry) -> String {
    let mut parts = vec![host_label(entry)];
    if let Some(latest) = entry.latest() {
        if !latest.reward_note.is_empty() {
            parts.push(latest.reward_note.clone());
        }
    }
    parts.join(META_SEPARATOR)
}

/// Placeholder shown before any report has been committed.
fn waiting_placeholder(list: ListKey) -> &'static str {
    match list {
        ListKey::Clean => "No data yet",
        ListKey::Issues => "Issues surface here",
    }
}

fn empty_placeholder(list: ListKey) -> &'static str {
    match list {
        ListKey::Clean => "No clean entries",
        ListKey::Issues => "No issue entries",
    }
}

pub fn render_row(list: ListKey, index: usize, entry: &HostEntry) -> String {
    let latest = entry.latest();
    let tls_tag = if latest.is_some_and(|l| l.tls) {
        r#"<span class="badge tls">TLS</span>"#
    } else {
        ""
    };
    format!(
        concat!(
            r#"<li role="button" tabindex="0" data-entry-index="{index}" data-entry-kind="{kind}">"#,
            r#"<div class="entry-header">"#,
            r#"<span class="badge {badge}">{pool}</span>"#,
            r#"<span class="entry-tags">{tls}<span class="entry-ping">{ping}</span></span>"#,
            r#"</div>"#,
            r#"<p class="entry-meta">{meta}</p>"#,
            r#"</li>"#
        ),
        index = index,
        kind = list.as_str(),
        badge = badge_class(entry),
        pool = escape(&entry.pool_name),
        tls = tls_tag,
        ping = escape(ping_text(latest)),
        meta = escape(&meta_line(entry)),
    )
}

/// Markup for one list. `None` means no report has been committed yet.
pub fn render_list(list: ListKey, entries: Option<&[HostEntry]>) -> String {
    let entries = match entries {
        None => return format!(r#"<li class="empty">{}</li>"#, waiting_placeholder(list)),
        Some(e) if e.is_empty() => {
            return format!(r#"<li class="empty">{}</li>"#, empty_placeholder(list))
        }
        Some(e) => e,
    };
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| render_row(list, i, entry))
        .collect()
}

/// Everything the page needs after a commit.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RenderedDashboard {
    pub generation: u64,
    pub clean_count: usize,
    pub issue_count: usize,
    pub summary: String,
    pub clean_html: String,
    pub issue_html: String,
    pub committed_at: Option<String>,
}

pub fn render_dashboard(snapshot: &StoreSnapshot) -> RenderedDashboard {
    let view = snapshot.view.as_deref();
    RenderedDashboard {
        generation: snapshot.generation,
        clean_count: snapshot.total_clean(),
        issue_count: snapshot.total_issues(),
        summary: snapshot.summary(),
        clean_html: render_list(ListKey::Clean, view.map(|v| v.entries(ListKey::Clean))),
        issue_html: render_list(ListKey::Issues, view.map(|v| v.entries(ListKey::Issues))),
        committed_at: snapshot.committed_at.clone(),
    }
}
