use serde::{Deserialize, Serialize};

use crate::cache::media::extension;
use crate::cache::Node;

// Listing item as served to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDto {
    pub file_id: String,
    pub parent_id: String,
    pub name: String,
    pub is_folder: bool,
    pub size: i64,
    pub size_fmt: String,
    pub path: String,
    pub parent_path: String,
    pub media_type: String,
    pub file_type: Option<String>,
    pub modified_at: Option<String>,
}

impl From<&Node> for NodeDto {
    fn from(n: &Node) -> Self {
        Self {
            file_id: n.file_id.clone(),
            parent_id: n.parent_id.clone(),
            name: n.name.clone(),
            is_folder: n.is_folder,
            size: n.size,
            size_fmt: if n.is_folder { "-".to_string() } else { format_size(n.size) },
            path: n.path.clone(),
            parent_path: n.parent_path.clone(),
            media_type: n.media_type.as_str().to_string(),
            file_type: if n.is_folder { None } else { extension(&n.name) },
            modified_at: n.modified_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Human readable size with binary units, e.g. `1.5 MB`.
pub fn format_size(bytes: i64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes.max(0))
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub account_id: String,
    pub path: String,
    pub parent_path: String,
    pub has_parent: bool,
    pub is_file: bool,
    pub locked: bool,
    pub supports_folder_download: bool,
    pub readme: Option<String>,
    pub entries: Vec<NodeDto>,
    /// Set when the README lookup hit an expired drive session. Not serialized.
    #[serde(skip)]
    pub session_expired: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub account_id: String,
    pub key: String,
    pub items: Vec<NodeDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    pub id: String,
    pub name: String,
    pub mode: String,
    pub is_default: bool,
    pub connected: bool,
    pub status: String,
    pub cookie_status: String,
    pub files_count: i64,
    pub last_synced_at: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    #[serde(default = "default_refresh_path")]
    pub path: String,
}

fn default_refresh_path() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub account_id: String,
    pub accepted: bool,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Full,
    Incremental,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    Started {
        account_id: String,
        mode: SyncMode,
        path: String,
    },
    Progress {
        account_id: String,
        current_path: String,
        folders_scanned: u64,
        nodes_observed: u64,
    },
    Done {
        account_id: String,
        mode: SyncMode,
        observed: u64,
        tombstoned: u64,
    },
    Failed {
        account_id: String,
        mode: SyncMode,
        message: String,
    },
    SessionRefreshed {
        account_id: String,
    },
    SessionFailed {
        account_id: String,
        message: String,
    },
}

impl SyncEvent {
    pub fn account_id(&self) -> &str {
        match self {
            SyncEvent::Started { account_id, .. }
            | SyncEvent::Progress { account_id, .. }
            | SyncEvent::Done { account_id, .. }
            | SyncEvent::Failed { account_id, .. }
            | SyncEvent::SessionRefreshed { account_id }
            | SyncEvent::SessionFailed { account_id, .. } => account_id,
        }
    }
}
