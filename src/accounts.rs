//! Configured accounts and their persisted status rows.

use std::fmt;

use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::AccountConfig;
use crate::error::AppError;
use crate::source::{Backend, DriveKind, DriveRegistry};
use crate::sync::guard::Track;

#[derive(Clone, Default)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    pub refresh_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub kind: DriveKind,
    pub root_id: String,
    #[serde(skip)]
    pub credentials: Credentials,
    pub is_default: bool,
}

impl From<&AccountConfig> for Account {
    fn from(cfg: &AccountConfig) -> Self {
        Self {
            id: cfg.id.clone(),
            name: if cfg.name.is_empty() { cfg.id.clone() } else { cfg.name.clone() },
            kind: cfg.mode,
            root_id: cfg.root_id.clone(),
            credentials: Credentials {
                user: cfg.user.clone(),
                password: cfg.password.clone(),
                refresh_token: cfg.refresh_token.clone(),
            },
            is_default: cfg.default,
        }
    }
}

/// An account together with the backend selected for it at load time.
#[derive(Debug, Clone)]
pub struct AccountEntry {
    pub account: Account,
    backend: Option<Backend>,
}

impl AccountEntry {
    pub fn new(account: Account, backend: Option<Backend>) -> Self {
        Self { account, backend }
    }

    pub fn id(&self) -> &str {
        &self.account.id
    }

    /// The bound backend. Accounts whose kind has no connector answer with `RemoteUnavailable`.
    pub fn backend(&self) -> Result<&Backend, AppError> {
        self.backend.as_ref().ok_or_else(|| {
            AppError::RemoteUnavailable(format!("no connector registered for {}", self.account.kind))
        })
    }
}

/// Immutable set of accounts, default account first.
#[derive(Debug, Clone, Default)]
pub struct AccountDirectory {
    entries: Vec<AccountEntry>,
}

impl AccountDirectory {
    pub fn load(configs: &[AccountConfig], drives: &DriveRegistry) -> Self {
        let mut entries: Vec<AccountEntry> = configs
            .iter()
            .map(|cfg| {
                let account = Account::from(cfg);
                let backend = drives.backend_for(account.kind);
                if backend.is_none() {
                    tracing::warn!(
                        "account {} uses {} but no connector is registered; it will stay empty",
                        account.id,
                        account.kind
                    );
                }
                AccountEntry::new(account, backend)
            })
            .collect();
        if !entries.iter().any(|e| e.account.is_default) {
            if let Some(first) = entries.first_mut() {
                first.account.is_default = true;
            }
        }
        entries.sort_by_key(|e| !e.account.is_default);
        Self { entries }
    }

    pub fn from_entries(entries: Vec<AccountEntry>) -> Self {
        Self { entries }
    }

    pub fn get(&self, id: &str) -> Option<&AccountEntry> {
        self.entries.iter().find(|e| e.account.id == id)
    }

    pub fn require(&self, id: &str) -> Result<&AccountEntry, AppError> {
        self.get(id).ok_or_else(|| AppError::NotFound(format!("account {} not found", id)))
    }

    pub fn default_account(&self) -> Option<&AccountEntry> {
        self.entries.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccountEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Persisted per-account status, as returned by `GET /api/accounts`.
#[derive(Debug, Clone, Serialize)]
pub struct AccountStatusRow {
    pub id: String,
    pub status: String,
    pub cookie_status: String,
    pub files_count: i64,
    pub last_synced_at: Option<String>,
    pub last_error: Option<String>,
}

/// Writes one row per configured account and removes accounts (with their nodes) that
/// are no longer configured.
pub async fn reconcile(pool: &SqlitePool, dir: &AccountDirectory) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for (seq, entry) in dir.iter().enumerate() {
        let a = &entry.account;
        sqlx::query(
            r#"INSERT INTO accounts (id, name, mode, root_id, is_default, seq)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name, mode = excluded.mode, root_id = excluded.root_id,
                 is_default = excluded.is_default, seq = excluded.seq,
                 status = 'idle', cookie_status = 'idle'"#,
        )
        .bind(&a.id)
        .bind(&a.name)
        .bind(a.kind.as_str())
        .bind(&a.root_id)
        .bind(if a.is_default { 1i64 } else { 0i64 })
        .bind(seq as i64)
        .execute(&mut *tx)
        .await?;
    }

    let existing: Vec<String> = sqlx::query("SELECT id FROM accounts")
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(|r| r.try_get::<String, _>("id"))
        .collect::<Result<_, _>>()?;
    for id in existing.iter().filter(|id| dir.get(id).is_none()) {
        tracing::info!("removing unconfigured account {} and its cached nodes", id);
        sqlx::query("DELETE FROM nodes WHERE account_id = ?").bind(id).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM accounts WHERE id = ?").bind(id).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

fn status_column(track: Track) -> &'static str {
    match track {
        Track::Crawl => "status",
        Track::Auth => "cookie_status",
    }
}

pub async fn record_status(pool: &SqlitePool, account_id: &str, track: Track, label: &str) -> Result<(), sqlx::Error> {
    let sql = format!("UPDATE accounts SET {} = ? WHERE id = ?", status_column(track));
    sqlx::query(&sql).bind(label).bind(account_id).execute(pool).await?;
    Ok(())
}

pub async fn record_sync_success(pool: &SqlitePool, account_id: &str, files_count: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE accounts SET status = 'idle', files_count = ?, last_synced_at = ?, last_error = NULL WHERE id = ?",
    )
    .bind(files_count)
    .bind(Utc::now().to_rfc3339())
    .bind(account_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Records a failed job. The track label resets to idle right away; the message stays in
/// `last_error` until the next successful sync.
pub async fn record_failure(pool: &SqlitePool, account_id: &str, track: Track, message: &str) -> Result<(), sqlx::Error> {
    let sql = format!("UPDATE accounts SET {} = 'idle', last_error = ? WHERE id = ?", status_column(track));
    sqlx::query(&sql).bind(message).bind(account_id).execute(pool).await?;
    Ok(())
}

pub async fn status_rows(pool: &SqlitePool) -> Result<Vec<AccountStatusRow>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, status, cookie_status, files_count, last_synced_at, last_error FROM accounts ORDER BY seq ASC",
    )
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|r| {
            Ok(AccountStatusRow {
                id: r.try_get("id")?,
                status: r.try_get("status")?,
                cookie_status: r.try_get("cookie_status")?,
                files_count: r.try_get("files_count")?,
                last_synced_at: r.try_get("last_synced_at")?,
                last_error: r.try_get("last_error")?,
            })
        })
        .collect()
}
