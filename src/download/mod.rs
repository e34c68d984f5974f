use std::path::PathBuf;
use std::sync::Arc;

use crate::accounts::AccountEntry;
use crate::cache::{Node, NodeStore, Visibility};
use crate::error::{AppError, OptionExt};
use crate::query::PasswordGate;
use crate::source::{Backend, SourceError};

/// Where the bytes of a file can be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    /// File on the local filesystem (native accounts).
    Local(PathBuf),
    /// Short-lived URL handed out by the remote backend.
    Url(String),
}

#[derive(Clone)]
pub struct DownloadResolver {
    store: NodeStore,
    gate: Arc<PasswordGate>,
}

impl DownloadResolver {
    pub fn new(store: NodeStore, gate: Arc<PasswordGate>) -> Self {
        Self { store, gate }
    }

    /// Resolves a visible, unlocked file to its download target.
    pub async fn resolve(
        &self,
        entry: &AccountEntry,
        file_id: &str,
        password: Option<&str>,
    ) -> Result<DownloadTarget, AppError> {
        let node = self
            .store
            .find_by_id(entry.id(), file_id, Visibility::Visible)
            .await?
            .ok_or_not_found(&format!("file {}", file_id))?;
        if node.is_folder {
            return Err(AppError::InvalidInput("folders cannot be downloaded directly".to_string()));
        }
        if self.gate.is_locked(&node.parent_id, password) {
            return Err(AppError::Unauthorized("password required for this folder".to_string()));
        }
        self.locate(entry, &node).await
    }

    /// Target of an already authorised node.
    pub async fn locate(&self, entry: &AccountEntry, node: &Node) -> Result<DownloadTarget, AppError> {
        let backend = entry.backend()?;
        let located = match backend {
            Backend::Native(drive) => drive.local_path(&entry.account.root_id, &node.file_id).map(DownloadTarget::Local),
            _ => match backend.remote() {
                Some(drive) => drive.download_url(&entry.account, &node.file_id).await.map(DownloadTarget::Url),
                None => Err(SourceError::Unavailable(format!("no connector for {}", backend.kind()))),
            },
        };
        located.map_err(|e| {
            if matches!(e, SourceError::SessionExpired(_)) {
                tracing::warn!("download link for {} failed, session of {} expired", node.file_id, entry.id());
            }
            AppError::from(e)
        })
    }
}
