//! Shared fixtures: in-memory database, a scriptable remote drive and config builders.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::accounts::{Account, Credentials};
use crate::cache::NodeStore;
use crate::config::{AccountConfig, AppConfig};
use crate::db;
use crate::query::HiddenSet;
use crate::source::{DriveKind, DriveRegistry, NativeDrive, RemoteDrive, RemoteEntry, SourceError};
use crate::state::AppState;
use crate::sync::guard::{SessionGuard, Track};
use crate::sync::Orchestrator;

pub const ROOT_ID: &str = "root";

/// Single connection so every query sees the same in-memory database.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::init_db(&pool).await.unwrap();
    pool
}

/// Remote drive backed by an in-memory folder map.
///
/// Folders without children need no entry; unknown folders list as empty unless a
/// failure is scripted for them.
#[derive(Default)]
pub struct FakeDrive {
    folders: Mutex<HashMap<String, Vec<RemoteEntry>>>,
    failures: Mutex<HashMap<String, SourceError>>,
    download_error: Mutex<Option<SourceError>>,
    download_base: Mutex<Option<String>>,
    refresh_error: Mutex<Option<SourceError>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    pub listed: AtomicUsize,
    pub refreshes: AtomicUsize,
}

impl FakeDrive {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_children(&self, folder_id: &str, entries: Vec<RemoteEntry>) {
        self.folders.lock().unwrap().insert(folder_id.to_string(), entries);
    }

    pub fn fail_on(&self, folder_id: &str, err: SourceError) {
        self.failures.lock().unwrap().insert(folder_id.to_string(), err);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn fail_downloads(&self, err: SourceError) {
        *self.download_error.lock().unwrap() = Some(err);
    }

    /// Download URLs become `{base}/{file_id}` instead of the default host.
    pub fn serve_downloads_from(&self, base: &str) {
        *self.download_base.lock().unwrap() = Some(base.trim_end_matches('/').to_string());
    }

    pub fn fail_refresh(&self, err: SourceError) {
        *self.refresh_error.lock().unwrap() = Some(err);
    }

    /// Blocks every listing until a permit is added to the returned semaphore.
    pub fn hold(&self) -> Arc<Semaphore> {
        let sem = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(sem.clone());
        sem
    }

    /// Standard tree used across tests:
    ///
    /// ```text
    /// /
    /// ├── Movies/            (movies)
    /// │   ├── a.mkv          (f-a)
    /// │   └── Sub/           (sub)
    /// │       └── b.mp4      (f-b)
    /// ├── Music/             (music)
    /// └── notes.txt          (f-notes)
    /// ```
    pub fn with_sample_tree() -> Arc<Self> {
        let drive = Self::new();
        drive.set_children(
            ROOT_ID,
            vec![
                RemoteEntry::folder("movies", "Movies"),
                RemoteEntry::folder("music", "Music"),
                RemoteEntry::file("f-notes", "notes.txt", 12),
            ],
        );
        drive.set_children(
            "movies",
            vec![RemoteEntry::file("f-a", "a.mkv", 2048), RemoteEntry::folder("sub", "Sub")],
        );
        drive.set_children("sub", vec![RemoteEntry::file("f-b", "b.mp4", 4096)]);
        drive
    }
}

#[async_trait]
impl RemoteDrive for FakeDrive {
    async fn list_children(&self, _account: &Account, folder_id: &str) -> Result<Vec<RemoteEntry>, SourceError> {
        self.listed.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(sem) = gate {
            let _permit = sem.acquire().await.unwrap();
        }
        if let Some(err) = self.failures.lock().unwrap().get(folder_id) {
            return Err(err.clone());
        }
        Ok(self.folders.lock().unwrap().get(folder_id).cloned().unwrap_or_default())
    }

    async fn download_url(&self, _account: &Account, file_id: &str) -> Result<String, SourceError> {
        if let Some(err) = self.download_error.lock().unwrap().clone() {
            return Err(err);
        }
        let base = self.download_base.lock().unwrap().clone();
        let base = base.unwrap_or_else(|| "https://dl.example.test".to_string());
        Ok(format!("{}/{}", base, file_id))
    }

    async fn refresh_session(&self, _account: &Account) -> Result<(), SourceError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        match self.refresh_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub fn cloud_account(id: &str) -> Account {
    Account {
        id: id.to_string(),
        name: id.to_string(),
        kind: DriveKind::Cloud189,
        root_id: ROOT_ID.to_string(),
        credentials: Credentials::default(),
        is_default: false,
    }
}

pub fn orchestrator(pool: &SqlitePool, hidden: HiddenSet) -> Orchestrator {
    orchestrator_with_cancel(pool, hidden, CancellationToken::new())
}

pub fn orchestrator_with_cancel(pool: &SqlitePool, hidden: HiddenSet, cancel: CancellationToken) -> Orchestrator {
    let (events, _) = broadcast::channel(64);
    Orchestrator::new(NodeStore::new(pool.clone()), Arc::new(hidden), 7, events, cancel)
}

pub fn account_config(id: &str, mode: DriveKind, root_id: &str) -> AccountConfig {
    AccountConfig {
        id: id.to_string(),
        name: String::new(),
        mode,
        root_id: root_id.to_string(),
        user: String::new(),
        password: String::new(),
        refresh_token: String::new(),
        default: false,
    }
}

/// Embedded defaults with the given accounts and no startup sync.
pub fn test_config(accounts: Vec<AccountConfig>) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.sync.sync_on_startup = false;
    cfg.accounts = accounts;
    cfg
}

/// Application state with one cloud189 account `main` served by `drive`.
pub async fn cloud_state(drive: Arc<FakeDrive>, tweak: impl FnOnce(&mut AppConfig)) -> AppState {
    let mut cfg = test_config(vec![account_config("main", DriveKind::Cloud189, ROOT_ID)]);
    tweak(&mut cfg);
    let registry = DriveRegistry::new(NativeDrive::default()).with_connector(DriveKind::Cloud189, drive);
    let state = AppState::new(memory_pool().await, cfg, registry);
    crate::jobs::bootstrap(&state).await.unwrap();
    state
}

/// Polls until no job of `track` runs for the account.
pub async fn wait_idle(guard: &SessionGuard, account_id: &str, track: Track) {
    for _ in 0..500 {
        if !guard.is_running(account_id, track) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} of {} did not finish", track, account_id);
}
