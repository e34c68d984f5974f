//! Crawling remote trees into the node cache.
//!
//! A crawl walks folders breadth first with an explicit worklist and keeps everything it
//! observes in memory. Nothing is written until the crawl has finished, and then the
//! whole result lands in one transaction. A failed or cancelled crawl leaves the cache
//! exactly as it was.

pub mod guard;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::accounts::Account;
use crate::cache::{self, normalize_path, Node, NodeStore, Visibility};
use crate::query::HiddenSet;
use crate::source::{Backend, SourceError};
use crate::types::SyncEvent;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("session expired: {0}")]
    SessionExpired(String),
    #[error("path not found: {0}")]
    PathNotFound(String),
    #[error("not a folder: {0}")]
    NotAFolder(String),
    #[error("sync cancelled")]
    Cancelled,
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        SyncError::Database(e.to_string())
    }
}

impl From<SourceError> for SyncError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::SessionExpired(m) => SyncError::SessionExpired(m),
            SourceError::Unavailable(m) | SourceError::NotFound(m) => SyncError::RemoteUnavailable(m),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Folders listed on the backend.
    pub folders: u64,
    /// Nodes observed and written.
    pub observed: u64,
    /// Previously live nodes tombstoned because they were not observed again.
    pub tombstoned: u64,
}

#[derive(Clone)]
pub struct Orchestrator {
    store: NodeStore,
    hidden: Arc<HiddenSet>,
    batch_size: usize,
    events: broadcast::Sender<SyncEvent>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        store: NodeStore,
        hidden: Arc<HiddenSet>,
        batch_size: usize,
        events: broadcast::Sender<SyncEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self { store, hidden, batch_size, events, cancel }
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    /// Replaces the account's cached tree with a fresh crawl from its root.
    pub async fn full_sync(&self, account: &Account, backend: &Backend) -> Result<SyncReport, SyncError> {
        info!("full sync of {} started", account.id);
        let (nodes, folders) = self.crawl(account, backend, &account.root_id, "/").await.map_err(|e| match e {
            SyncError::PathNotFound(m) => SyncError::RemoteUnavailable(format!("account root missing: {}", m)),
            other => other,
        })?;

        let mut tx = self.store.pool().begin().await?;
        let previous = cache::clear_account(&mut tx, &account.id).await?;
        let mut rows = Vec::with_capacity(nodes.len() + 1);
        rows.push(Node::root(&account.root_id));
        rows.extend(nodes);
        cache::upsert_batch(&mut tx, &account.id, &rows, self.batch_size).await?;
        tx.commit().await?;

        let observed = (rows.len() - 1) as u64;
        info!("full sync of {} done: {} nodes (replaced {} rows)", account.id, observed, previous);
        Ok(SyncReport { folders, observed, tombstoned: 0 })
    }

    /// Re-crawls the folder at `path` and reconciles its subtree.
    ///
    /// Observed nodes are upserted live; previously live descendants that were not
    /// observed again are tombstoned. A folder that has vanished remotely is tombstoned
    /// together with its subtree.
    pub async fn incremental_sync(
        &self,
        account: &Account,
        backend: &Backend,
        raw_path: &str,
    ) -> Result<SyncReport, SyncError> {
        let path = normalize_path(raw_path);
        let target = self.resolve_folder(account, &path).await?;
        let root_missing = target.is_none();
        let target = target.unwrap_or_else(|| Node::root(&account.root_id));
        info!("incremental sync of {}:{} started", account.id, path);

        let before = self.store.descendants(&account.id, &target.file_id).await?;
        let (nodes, folders) = match self.crawl(account, backend, &target.file_id, &target.path).await {
            Ok(found) => found,
            Err(SyncError::PathNotFound(_)) if !target.is_root() => {
                let pruned = self.store.mark_deleted_subtree(&account.id, &target.file_id, true).await?;
                warn!("{}:{} no longer exists remotely, tombstoned {} nodes", account.id, path, pruned);
                return Ok(SyncReport { folders: 0, observed: 0, tombstoned: pruned });
            }
            Err(SyncError::PathNotFound(m)) => return Err(SyncError::RemoteUnavailable(m)),
            Err(e) => return Err(e),
        };

        let seen: HashSet<&str> = nodes.iter().map(|n| n.file_id.as_str()).collect();
        let stale: Vec<String> = before.into_iter().filter(|id| !seen.contains(id.as_str())).collect();

        let mut tx = self.store.pool().begin().await?;
        if root_missing {
            cache::upsert_batch(&mut tx, &account.id, std::slice::from_ref(&target), self.batch_size).await?;
        }
        cache::upsert_batch(&mut tx, &account.id, &nodes, self.batch_size).await?;
        let tombstoned = cache::mark_deleted(&mut tx, &account.id, &stale).await?;
        tx.commit().await?;

        info!(
            "incremental sync of {}:{} done: {} observed, {} tombstoned",
            account.id,
            path,
            nodes.len(),
            tombstoned
        );
        Ok(SyncReport { folders, observed: nodes.len() as u64, tombstoned })
    }

    /// Folder node at `path`. `Ok(None)` means the root of a never-synced account.
    async fn resolve_folder(&self, account: &Account, path: &str) -> Result<Option<Node>, SyncError> {
        match self.store.find_by_path(&account.id, path, Visibility::Live).await? {
            Some(node) if node.is_folder => Ok(Some(node)),
            Some(_) => Err(SyncError::NotAFolder(path.to_string())),
            None if path == "/" => Ok(None),
            None => Err(SyncError::PathNotFound(path.to_string())),
        }
    }

    /// Breadth-first walk below `start_id`. Returns the observed nodes (start folder
    /// excluded) and the number of folders listed.
    ///
    /// A remote `NotFound` on the start folder surfaces as `PathNotFound`; on any other
    /// folder that folder is dropped from the result, since it vanished after its parent
    /// was listed.
    async fn crawl(
        &self,
        account: &Account,
        backend: &Backend,
        start_id: &str,
        start_path: &str,
    ) -> Result<(Vec<Node>, u64), SyncError> {
        let mut queue: VecDeque<(String, String)> = VecDeque::from([(start_id.to_string(), start_path.to_string())]);
        let mut seen: HashSet<String> = HashSet::from([start_id.to_string()]);
        let mut vanished: HashSet<String> = HashSet::new();
        let mut out: Vec<Node> = Vec::new();
        let mut folders = 0u64;

        while let Some((folder_id, folder_path)) = queue.pop_front() {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let entries = match backend.list_children(account, &folder_id).await {
                Ok(entries) => entries,
                Err(SourceError::NotFound(m)) if folder_id == start_id => return Err(SyncError::PathNotFound(m)),
                Err(SourceError::NotFound(_)) => {
                    debug!("{} vanished during crawl of {}", folder_path, account.id);
                    vanished.insert(folder_id);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            folders += 1;

            for entry in &entries {
                // Ids already placed elsewhere in the tree (cycles, shared folders) are skipped.
                if !seen.insert(entry.id.clone()) {
                    continue;
                }
                let node = Node::observed(entry, &folder_id, &folder_path, &self.hidden);
                if node.is_folder {
                    queue.push_back((node.file_id.clone(), node.path.clone()));
                }
                out.push(node);
            }

            let _ = self.events.send(SyncEvent::Progress {
                account_id: account.id.clone(),
                current_path: folder_path,
                folders_scanned: folders,
                nodes_observed: out.len() as u64,
            });
        }

        if !vanished.is_empty() {
            out.retain(|n| !vanished.contains(&n.file_id));
        }
        Ok((out, folders))
    }
}
