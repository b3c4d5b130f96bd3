use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// The canonical report: every tracked pool, already partitioned by the backend
/// into clean and issue lists.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct DashboardView {
    #[serde(default, deserialize_with = "null_as_default")]
    pub clean_entries: Vec<HostEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub issue_entries: Vec<HostEntry>,
    #[serde(default)]
    pub sort_by: String,
    #[serde(default)]
    pub host_filter: String,
}

impl DashboardView {
    pub fn entries(&self, list: ListKey) -> &[HostEntry] {
        match list {
            ListKey::Clean => &self.clean_entries,
            ListKey::Issues => &self.issue_entries,
        }
    }

    pub fn total_clean(&self) -> usize {
        self.clean_entries.len()
    }

    pub fn total_issues(&self) -> usize {
        self.issue_entries.len()
    }

    /// True when the backend had nothing to report (no pools in either list).
    pub fn is_empty(&self) -> bool {
        self.clean_entries.is_empty() && self.issue_entries.is_empty()
    }
}

/// One tracked endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct HostEntry {
    #[serde(default)]
    pub pool_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub host: HostView,
    #[serde(default)]
    pub log_file: String,
}

impl HostEntry {
    /// Most recent completed scan result, if the host has been reached successfully.
    pub fn latest(&self) -> Option<&EntryView> {
        self.host.latest.as_ref()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct HostView {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub latest: Option<EntryView>,
}

/// Immutable scan snapshot produced by the backend.
///
/// The dashboard never interprets these values beyond rendering them; the
/// style tags (`panel_class`, `reward_class`, `ping_class`) arrive
/// pre-classified.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct EntryView {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub timestamp_raw: Option<String>,
    #[serde(default)]
    pub log_file: String,
    #[serde(default)]
    pub pool_name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub port_display: String,
    #[serde(default)]
    pub ping: Option<String>,
    #[serde(default)]
    pub ping_summary_primary: Option<PingSummary>,
    #[serde(rename = "PingSummaryTLS", default)]
    pub ping_summary_tls: Option<PingSummary>,
    #[serde(default)]
    pub ping_sort: f64,
    #[serde(default)]
    pub total_payout: Option<f64>,
    #[serde(default)]
    pub worker_share: Option<f64>,
    #[serde(default)]
    pub worker_percent: Option<f64>,
    #[serde(default)]
    pub pool_wallet: String,
    #[serde(default)]
    pub pool_wallet_disp: String,
    #[serde(rename = "PoolWalletURL", default)]
    pub pool_wallet_url: String,
    #[serde(default)]
    pub has_pool_wallet: bool,
    #[serde(rename = "TLS", default)]
    pub tls: bool,
    #[serde(rename = "ShowTLSPanel", default)]
    pub show_tls_panel: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub issues: Vec<IssueDetail>,
    #[serde(default)]
    pub issue_severity: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_payouts: Vec<PayoutView>,
    #[serde(default)]
    pub split_count: i64,
    #[serde(default)]
    pub has_data: bool,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub panel_class: String,
    #[serde(default)]
    pub reward_note: String,
    #[serde(default)]
    pub reward_class: String,
    #[serde(default)]
    pub ping_class: String,
    #[serde(rename = "ScanURL", default)]
    pub scan_url: String,
    #[serde(rename = "HistoryURL", default)]
    pub history_url: String,
    #[serde(default)]
    pub job_latency: String,
    #[serde(default)]
    pub job_latency_class: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PingSummary {
    #[serde(default)]
    pub exists: bool,
    #[serde(default)]
    pub min: String,
    #[serde(default)]
    pub avg: String,
    #[serde(default)]
    pub max: String,
    #[serde(default)]
    pub samples: u64,
    #[serde(default)]
    pub avg_value: f64,
    #[serde(default)]
    pub jitter: String,
    #[serde(default)]
    pub real_ping: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct IssueDetail {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub score: i64,
}

/// One coinbase output as reported by the backend. Field names follow the
/// backend's wire casing.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PayoutView {
    #[serde(default)]
    pub output_index: u32,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub amount_btc: f64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "IsWorker", default)]
    pub is_worker: bool,
    #[serde(rename = "Percent", default)]
    pub percent: f64,
}

/// Which of the two classified lists a row belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKey {
    #[serde(rename = "CleanEntries")]
    Clean,
    #[serde(rename = "IssueEntries")]
    Issues,
}

impl ListKey {
    pub fn as_str(self) -> &'static str {
        match self {
            ListKey::Clean => "CleanEntries",
            ListKey::Issues => "IssueEntries",
        }
    }
}

impl fmt::Display for ListKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CleanEntries" | "clean" => Ok(ListKey::Clean),
            "IssueEntries" | "issues" => Ok(ListKey::Issues),
            other => Err(anyhow::anyhow!("unknown list: {other}")),
        }
    }
}

/// The backend writes empty lists and missing hosts as `null`; treat those as empty.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_lists_and_hosts_decode_as_empty() {
        let raw = r#"{"CleanEntries":null,"IssueEntries":[{"PoolName":"p","Host":null,"LogFile":""}],"SortBy":"ping","HostFilter":""}"#;
        let view: DashboardView = serde_json::from_str(raw).unwrap();
        assert!(view.clean_entries.is_empty());
        assert_eq!(view.issue_entries.len(), 1);
        assert!(view.issue_entries[0].latest().is_none());
        assert_eq!(view.issue_entries[0].host.host, "");
    }

    #[test]
    fn entry_view_uses_backend_field_names() {
        let raw = r#"{"Host":"pool.example","Port":3333,"TLS":true,"ScanURL":"https://x","TotalPayout":3.125,"Issues":null}"#;
        let e: EntryView = serde_json::from_str(raw).unwrap();
        assert!(e.tls);
        assert_eq!(e.port, 3333);
        assert_eq!(e.scan_url, "https://x");
        assert_eq!(e.total_payout, Some(3.125));
        assert!(e.issues.is_empty());
        assert_eq!(e.worker_percent, None);
    }

    #[test]
    fn list_key_parses_attribute_names() {
        assert_eq!("CleanEntries".parse::<ListKey>().unwrap(), ListKey::Clean);
        assert_eq!("issues".parse::<ListKey>().unwrap(), ListKey::Issues);
        assert!("bogus".parse::<ListKey>().is_err());
    }
}
