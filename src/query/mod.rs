//! Read side of the cache: path listings, README previews and name search.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use tokio::io::AsyncReadExt;

use crate::accounts::AccountEntry;
use crate::cache::{normalize_path, parent_path, Node, NodeStore, Visibility};
use crate::download::{DownloadResolver, DownloadTarget};
use crate::error::AppError;
use crate::types::{Listing, NodeDto};

const README_NAME: &str = "README.md";
const README_CACHE_ENTRIES: usize = 256;
const MAX_SEARCH_TERM_CHARS: usize = 200;

/// File ids excluded from listings and search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HiddenSet {
    ids: HashSet<String>,
}

impl HiddenSet {
    /// Parses a comma separated id list. Blank items are ignored.
    pub fn parse(raw: &str) -> Self {
        let ids = raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect();
        Self { ids }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed folder password entry {0:?}, expected folderId:password")]
pub struct GateParseError(String);

/// Folder id to password map. A locked folder hides its listing and the downloads of
/// its direct children until the password is supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordGate {
    passwords: HashMap<String, String>,
}

impl PasswordGate {
    /// Parses comma separated `folderId:password` pairs. Only the first `:` splits, so
    /// passwords may contain colons.
    pub fn parse(raw: &str) -> Result<Self, GateParseError> {
        let mut passwords = HashMap::new();
        for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item.split_once(':') {
                Some((id, pwd)) if !id.trim().is_empty() && !pwd.is_empty() => {
                    passwords.insert(id.trim().to_string(), pwd.to_string());
                }
                _ => return Err(GateParseError(item.to_string())),
            }
        }
        Ok(Self { passwords })
    }

    pub fn is_protected(&self, folder_id: &str) -> bool {
        self.passwords.contains_key(folder_id)
    }

    pub fn is_locked(&self, folder_id: &str, supplied: Option<&str>) -> bool {
        match self.passwords.get(folder_id) {
            Some(expected) => supplied != Some(expected.as_str()),
            None => false,
        }
    }
}

/// Bounded cache of README previews keyed by (account, file id, mtime).
#[derive(Clone)]
pub struct ReadmeCache {
    http: reqwest::Client,
    entries: Arc<Mutex<LruCache<(String, String, i64), String>>>,
    max_bytes: usize,
    timeout: Duration,
}

/// Result of a README lookup. An expired session is reported separately so the caller
/// can schedule a refresh; every other failure just omits the preview.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReadmeFetch {
    Found(String),
    Missing,
    SessionExpired,
}

impl ReadmeCache {
    pub fn new(max_bytes: usize, timeout: Duration) -> Self {
        let cap = NonZeroUsize::new(README_CACHE_ENTRIES).unwrap_or(NonZeroUsize::MIN);
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("README HTTP client fell back to defaults: {}", e);
                reqwest::Client::new()
            });
        Self { http, entries: Arc::new(Mutex::new(LruCache::new(cap))), max_bytes, timeout }
    }

    pub fn clear(&self) {
        let mut guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        guard.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Preview text for `node`. Fetch failures never fail the listing.
    async fn load(&self, resolver: &DownloadResolver, entry: &AccountEntry, node: &Node) -> ReadmeFetch {
        let key = (
            entry.id().to_string(),
            node.file_id.clone(),
            node.modified_at.map(|t| t.timestamp()).unwrap_or_default(),
        );
        if let Some(hit) = self.entries.lock().unwrap_or_else(|p| p.into_inner()).get(&key) {
            return ReadmeFetch::Found(hit.clone());
        }

        let text = match resolver.locate(entry, node).await {
            Ok(DownloadTarget::Local(path)) => self.read_local(&path).await,
            Ok(DownloadTarget::Url(url)) => {
                // The client timeout covers the request; this also bounds the body stream.
                match tokio::time::timeout(self.timeout, self.read_remote(&url)).await {
                    Ok(text) => text,
                    Err(_) => {
                        tracing::warn!("README fetch for {} timed out after {:?}", entry.id(), self.timeout);
                        None
                    }
                }
            }
            Err(AppError::SessionExpired(msg)) => {
                tracing::warn!("README of {} needs a fresh session: {}", entry.id(), msg);
                return ReadmeFetch::SessionExpired;
            }
            Err(e) => {
                tracing::debug!("README of {} not resolvable: {}", entry.id(), e);
                None
            }
        };

        match text {
            Some(text) => {
                self.entries.lock().unwrap_or_else(|p| p.into_inner()).put(key, text.clone());
                ReadmeFetch::Found(text)
            }
            None => ReadmeFetch::Missing,
        }
    }

    async fn read_local(&self, path: &std::path::Path) -> Option<String> {
        let file = tokio::fs::File::open(path).await.ok()?;
        let mut buf = Vec::new();
        file.take(self.max_bytes as u64).read_to_end(&mut buf).await.ok()?;
        Some(String::from_utf8_lossy(&buf).into_owned())
    }

    async fn read_remote(&self, url: &str) -> Option<String> {
        let mut resp = match self.http.get(url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::debug!("README fetch returned {}", r.status());
                return None;
            }
            Err(e) => {
                tracing::debug!("README fetch failed: {}", e);
                return None;
            }
        };
        let mut buf: Vec<u8> = Vec::new();
        while buf.len() < self.max_bytes {
            match resp.chunk().await {
                Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("README body read failed: {}", e);
                    return None;
                }
            }
        }
        buf.truncate(self.max_bytes);
        Some(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn sanitize_search_term(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput("search key cannot be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_SEARCH_TERM_CHARS {
        return Err(AppError::InvalidInput("search key too long".to_string()));
    }
    let sanitized: String = trimmed.chars().filter(|ch| !ch.is_control()).collect();
    if sanitized.trim().is_empty() {
        return Err(AppError::InvalidInput("search key contains only control characters".to_string()));
    }
    Ok(sanitized)
}

#[derive(Clone)]
pub struct QueryService {
    store: NodeStore,
    gate: Arc<PasswordGate>,
    resolver: DownloadResolver,
    readme: ReadmeCache,
    search_limit: i64,
}

impl QueryService {
    pub fn new(
        store: NodeStore,
        gate: Arc<PasswordGate>,
        resolver: DownloadResolver,
        readme: ReadmeCache,
        search_limit: i64,
    ) -> Self {
        Self { store, gate, resolver, readme, search_limit }
    }

    pub fn readme_cache(&self) -> &ReadmeCache {
        &self.readme
    }

    /// Lists the folder at `raw_path`, or describes the file there.
    ///
    /// A locked folder comes back with `locked = true` and no entries.
    pub async fn list_by_path(
        &self,
        entry: &AccountEntry,
        raw_path: &str,
        password: Option<&str>,
    ) -> Result<Listing, AppError> {
        let path = normalize_path(raw_path);
        let account_id = entry.id();
        let supports_folder_download = entry.backend().map(|b| b.supports_folder_download()).unwrap_or(false);

        let node = self.store.find_by_path(account_id, &path, Visibility::Visible).await?;
        let node = match node {
            Some(n) => n,
            // Root of an account that has not been synced yet.
            None if path == "/" => Node::root(&entry.account.root_id),
            None => return Err(AppError::NotFound(format!("path {} not found", path))),
        };

        let mut listing = Listing {
            account_id: account_id.to_string(),
            path: path.clone(),
            parent_path: parent_path(&path),
            has_parent: path != "/",
            is_file: !node.is_folder,
            locked: false,
            supports_folder_download,
            readme: None,
            entries: Vec::new(),
            session_expired: false,
        };

        if !node.is_folder {
            if self.gate.is_locked(&node.parent_id, password) {
                listing.locked = true;
                return Ok(listing);
            }
            listing.entries.push(NodeDto::from(&node));
            return Ok(listing);
        }

        if self.gate.is_locked(&node.file_id, password) {
            listing.locked = true;
            return Ok(listing);
        }

        let children = self.store.list_children(account_id, &path, Visibility::Visible).await?;
        if let Some(readme) = children.iter().find(|n| !n.is_folder && n.name == README_NAME) {
            match self.readme.load(&self.resolver, entry, readme).await {
                ReadmeFetch::Found(text) => listing.readme = Some(text),
                ReadmeFetch::Missing => {}
                ReadmeFetch::SessionExpired => listing.session_expired = true,
            }
        }
        listing.entries = children.iter().map(NodeDto::from).collect();
        Ok(listing)
    }

    /// Visible nodes whose name contains `key`, capped at the configured search limit.
    pub async fn search(&self, entry: &AccountEntry, key: &str, limit: Option<i64>) -> Result<Vec<NodeDto>, AppError> {
        let term = sanitize_search_term(key)?;
        let limit = limit.unwrap_or(self.search_limit).clamp(1, self.search_limit);
        let nodes = self.store.search_by_name(entry.id(), &term, limit).await?;
        Ok(nodes.iter().map(NodeDto::from).collect())
    }
}
