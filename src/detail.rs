//! The detail overlay opened from a list row.

use serde::Serialize;
use tracing::debug;

use crate::error::DashError;
use crate::render::escape;
use crate::store::StoreSnapshot;
use crate::types::{EntryView, HostEntry, ListKey};

pub const PAYOUT_UNIT: &str = "BTC";
const DEFAULT_TITLE: &str = "Pool details";
const PLACEHOLDER_URL: &str = "#";

/// One labelled line of the overlay, in display order.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetailField {
    Tls,
    Endpoint { value: String },
    Ping { value: String },
    TotalPayout { value: String },
    WorkerShare { value: String },
    Note { value: String },
    Disconnected { last_error: Option<String> },
    Issues { messages: Vec<String> },
    ExternalLink { url: String },
}

/// Everything shown for one pool. Only present data produces a field.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DetailRecord {
    pub list: ListKey,
    pub index: usize,
    pub title: String,
    pub fields: Vec<DetailField>,
}

impl DetailRecord {
    pub fn build(list: ListKey, index: usize, entry: &HostEntry, latest: &EntryView) -> Self {
        let mut fields = Vec::new();

        if latest.tls {
            fields.push(DetailField::Tls);
        }

        let endpoint = if latest.host.is_empty() {
            "unknown".to_string()
        } else {
            format!("{}:{}", latest.host, latest.port)
        };
        fields.push(DetailField::Endpoint { value: endpoint });

        let ping = latest
            .ping
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or("n/a");
        fields.push(DetailField::Ping {
            value: ping.to_string(),
        });

        let payout = match latest.total_payout {
            Some(v) if v.is_finite() => format!("{v:.8} {PAYOUT_UNIT}"),
            _ => "n/a".to_string(),
        };
        fields.push(DetailField::TotalPayout { value: payout });

        if let Some(pct) = latest.worker_percent.filter(|p| *p > 0.0) {
            fields.push(DetailField::WorkerShare {
                value: format!("{pct:.2}%"),
            });
        }

        if !latest.reward_note.is_empty() {
            fields.push(DetailField::Note {
                value: latest.reward_note.clone(),
            });
        }

        if !latest.connected {
            fields.push(DetailField::Disconnected {
                last_error: Some(latest.error.clone()).filter(|e| !e.is_empty()),
            });
        }

        if !latest.issues.is_empty() {
            let messages = latest
                .issues
                .iter()
                .map(|issue| {
                    issue
                        .message
                        .clone()
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| "Issue".to_string())
                })
                .collect();
            fields.push(DetailField::Issues { messages });
        }

        if let Some(url) = external_url(latest) {
            fields.push(DetailField::ExternalLink {
                url: url.to_string(),
            });
        }

        let title = if entry.pool_name.is_empty() {
            DEFAULT_TITLE.to_string()
        } else {
            entry.pool_name.clone()
        };

        Self {
            list,
            index,
            title,
            fields,
        }
    }

    pub fn external_url(&self) -> Option<&str> {
        self.fields.iter().find_map(|f| match f {
            DetailField::ExternalLink { url } => Some(url.as_str()),
            _ => None,
        })
    }

    /// Overlay markup, title first; every value is escaped.
    pub fn render_html(&self) -> String {
        let mut out = format!(
            r#"<h3 class="detail-title" id="detailTitle">{}</h3>"#,
            escape(&self.title)
        );
        for field in &self.fields {
            match field {
                DetailField::Tls => out.push_str(&row(
                    "TLS",
                    None,
                    r#"<span class="badge tls">TLS</span>"#,
                )),
                DetailField::Endpoint { value } => {
                    out.push_str(&row("Endpoint", Some("mono"), &escape(value)))
                }
                DetailField::Ping { value } => {
                    out.push_str(&row("Ping", Some("mono"), &escape(value)))
                }
                DetailField::TotalPayout { value } => {
                    out.push_str(&row("Total payout", Some("mono"), &escape(value)))
                }
                DetailField::WorkerShare { value } => {
                    out.push_str(&row("Worker share", Some("mono"), &escape(value)))
                }
                DetailField::Note { value } => out.push_str(&row("Note", None, &escape(value))),
                DetailField::Disconnected { last_error } => {
                    out.push_str(&row("Status", None, "Disconnected"));
                    if let Some(err) = last_error {
                        out.push_str(&row("Last error", Some("mono"), &escape(err)));
                    }
                }
                DetailField::Issues { messages } => {
                    out.push_str(r#"<div class="detail-section"><div class="detail-key">Issues</div><ul class="detail-list">"#);
                    for m in messages {
                        out.push_str("<li>");
                        out.push_str(&escape(m));
                        out.push_str("</li>");
                    }
                    out.push_str("</ul></div>");
                }
                DetailField::ExternalLink { .. } => out.push_str(
                    r#"<div class="detail-actions"><button class="btn ghost" id="openDetailUrl" type="button">Open details</button></div>"#,
                ),
            }
        }
        out
    }
}

fn row(key: &str, class: Option<&str>, value_html: &str) -> String {
    let class = match class {
        Some(c) => format!("detail-value {c}"),
        None => "detail-value".to_string(),
    };
    format!(
        r#"<div class="detail-row"><span class="detail-key">{key}</span><span class="{class}">{value_html}</span></div>"#
    )
}

fn external_url(latest: &EntryView) -> Option<&str> {
    let url = latest.scan_url.trim();
    if url.is_empty() || url == PLACEHOLDER_URL {
        None
    } else {
        Some(url)
    }
}

/// Stateful overlay. Holds nothing but the record it is currently showing.
#[derive(Debug, Default)]
pub struct DetailPanel {
    open: Option<DetailRecord>,
}

impl DetailPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn current(&self) -> Option<&DetailRecord> {
        self.open.as_ref()
    }

    /// Open the row at `index` of `list` in the snapshot's view.
    ///
    /// A missing view, an out-of-range index, or a row without a scan result
    /// leaves the panel exactly as it was.
    pub fn open(
        &mut self,
        snapshot: &StoreSnapshot,
        list: ListKey,
        index: usize,
    ) -> Result<&DetailRecord, DashError> {
        let stale = || DashError::StaleDetailAccess {
            list,
            index: index.to_string(),
        };
        let view = snapshot.view.as_deref().ok_or_else(stale)?;
        let entry = view.entries(list).get(index).ok_or_else(stale)?;
        let latest = entry.latest().ok_or_else(stale)?;

        let record = DetailRecord::build(list, index, entry, latest);
        debug!(%list, index, title = %record.title, "detail opened");
        Ok(self.open.insert(record))
    }

    /// Open from a row's `data-entry-index` attribute. Anything that is not a
    /// non-negative whole number (including `NaN`) is a silent no-op.
    pub fn open_from_attr(
        &mut self,
        snapshot: &StoreSnapshot,
        list: ListKey,
        raw: &str,
    ) -> Result<&DetailRecord, DashError> {
        let index = parse_index(raw).ok_or_else(|| DashError::StaleDetailAccess {
            list,
            index: raw.to_string(),
        })?;
        self.open(snapshot, list, index)
    }

    pub fn close(&mut self) {
        self.open = None;
    }
}

fn parse_index(raw: &str) -> Option<usize> {
    let n: f64 = raw.trim().parse().ok()?;
    if !n.is_finite() || n < 0.0 || n.fract() != 0.0 || n > usize::MAX as f64 {
        return None;
    }
    Some(n as usize)
}
