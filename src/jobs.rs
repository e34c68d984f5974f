//! Background jobs: sync and session refresh triggers plus the periodic scheduler.
//!
//! Triggers claim the account's track on the [`SessionGuard`](crate::sync::guard::SessionGuard)
//! before anything is spawned, so a caller learns synchronously whether its job was
//! accepted or the account was busy.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tracing::{error, info, warn};

use crate::accounts::{self, AccountEntry};
use crate::cache::{normalize_path, Visibility};
use crate::error::{AppError, AppResult};
use crate::middleware::rate_limit::global_limiter;
use crate::source::Backend;
use crate::state::AppState;
use crate::sync::guard::{GuardError, JobTicket, Track};
use crate::sync::SyncError;
use crate::types::{SyncEvent, SyncMode, TriggerResponse};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Accepted,
    Busy,
    Skipped(&'static str),
}

impl TriggerOutcome {
    pub fn into_response(self, account_id: &str) -> TriggerResponse {
        let (accepted, status, message) = match self {
            TriggerOutcome::Accepted => (true, "accepted", "job started".to_string()),
            TriggerOutcome::Busy => (false, "busy", "a job is already running for this account".to_string()),
            TriggerOutcome::Skipped(reason) => (false, "skipped", reason.to_string()),
        };
        TriggerResponse { account_id: account_id.to_string(), accepted, status: status.to_string(), message }
    }
}

fn claim(state: &AppState, account_id: &str, track: Track) -> Option<JobTicket> {
    match state.guard.try_begin(account_id, track) {
        Ok(ticket) => Some(ticket),
        Err(GuardError::Busy { .. }) => {
            info!("{} for {} rejected, already running", track, account_id);
            if track == Track::Crawl {
                state.metrics.inc_syncs_rejected();
            }
            None
        }
    }
}

fn lookup(state: &AppState, account_id: &str) -> AppResult<(AccountEntry, Backend)> {
    let entry = state.accounts.require(account_id)?.clone();
    let backend = entry.backend()?.clone();
    Ok((entry, backend))
}

/// Starts a full resync of one account in the background.
pub fn trigger_full_sync(state: &AppState, account_id: &str) -> AppResult<TriggerOutcome> {
    let (entry, backend) = lookup(state, account_id)?;
    let Some(ticket) = claim(state, account_id, Track::Crawl) else {
        return Ok(TriggerOutcome::Busy);
    };
    let st = state.clone();
    tokio::spawn(async move { run_sync(st, entry, backend, SyncMode::Full, "/".to_string(), ticket).await });
    Ok(TriggerOutcome::Accepted)
}

/// Starts an incremental refresh of the folder at `path`.
///
/// Unknown paths and files are rejected before anything is claimed.
pub async fn trigger_incremental_sync(state: &AppState, account_id: &str, path: &str) -> AppResult<TriggerOutcome> {
    let (entry, backend) = lookup(state, account_id)?;
    let path = normalize_path(path);
    match state.store.find_by_path(account_id, &path, Visibility::Live).await? {
        Some(node) if !node.is_folder => {
            return Err(AppError::InvalidInput(format!("{} is not a folder", path)));
        }
        None if path != "/" => return Err(AppError::NotFound(format!("path {} not found", path))),
        _ => {}
    }
    let Some(ticket) = claim(state, account_id, Track::Crawl) else {
        return Ok(TriggerOutcome::Busy);
    };
    let st = state.clone();
    tokio::spawn(async move { run_sync(st, entry, backend, SyncMode::Incremental, path, ticket).await });
    Ok(TriggerOutcome::Accepted)
}

/// Starts a session refresh. Accounts without a session are skipped.
pub fn trigger_cookie_refresh(state: &AppState, account_id: &str) -> AppResult<TriggerOutcome> {
    let (entry, backend) = lookup(state, account_id)?;
    if !backend.needs_session() {
        return Ok(TriggerOutcome::Skipped("account has no remote session"));
    }
    let Some(ticket) = claim(state, account_id, Track::Auth) else {
        return Ok(TriggerOutcome::Busy);
    };
    let st = state.clone();
    tokio::spawn(async move { run_session_refresh(st, entry, backend, ticket).await });
    Ok(TriggerOutcome::Accepted)
}

/// Applies `trigger` to every account that has a backend.
pub fn trigger_all<F>(state: &AppState, trigger: F) -> Vec<TriggerResponse>
where
    F: Fn(&AppState, &str) -> AppResult<TriggerOutcome>,
{
    state
        .accounts
        .iter()
        .map(|entry| {
            let id = entry.id();
            match trigger(state, id) {
                Ok(outcome) => outcome.into_response(id),
                Err(e) => TriggerResponse {
                    account_id: id.to_string(),
                    accepted: false,
                    status: "error".to_string(),
                    message: e.to_string(),
                },
            }
        })
        .collect()
}

async fn run_sync(state: AppState, entry: AccountEntry, backend: Backend, mode: SyncMode, path: String, ticket: JobTicket) {
    let id = entry.id().to_string();
    state.metrics.inc_syncs_started();
    if let Err(e) = accounts::record_status(&state.db, &id, Track::Crawl, "syncing").await {
        warn!("failed to persist status of {}: {}", id, e);
    }
    let _ = state.events.send(SyncEvent::Started { account_id: id.clone(), mode, path: path.clone() });

    let result = match mode {
        SyncMode::Full => state.orchestrator.full_sync(&entry.account, &backend).await,
        SyncMode::Incremental => state.orchestrator.incremental_sync(&entry.account, &backend, &path).await,
    };

    match result {
        Ok(report) => {
            state.metrics.inc_syncs_completed();
            state.metrics.add_nodes_written(report.observed);
            state.metrics.add_nodes_tombstoned(report.tombstoned);
            if mode == SyncMode::Full {
                state.query.readme_cache().clear();
            }
            let count = state.store.count_live(&id).await.unwrap_or_else(|e| {
                warn!("failed to count nodes of {}: {}", id, e);
                0
            });
            if let Err(e) = accounts::record_sync_success(&state.db, &id, count).await {
                warn!("failed to persist sync result of {}: {}", id, e);
            }
            let _ = state.events.send(SyncEvent::Done {
                account_id: id.clone(),
                mode,
                observed: report.observed,
                tombstoned: report.tombstoned,
            });
            ticket.succeed();
        }
        Err(SyncError::Cancelled) => {
            info!("sync of {} cancelled", id);
            if let Err(e) = accounts::record_status(&state.db, &id, Track::Crawl, "idle").await {
                warn!("failed to persist status of {}: {}", id, e);
            }
            drop(ticket);
        }
        Err(e) => {
            state.metrics.inc_syncs_failed();
            let message = e.to_string();
            error!("sync of {} failed: {}", id, message);
            if let Err(db_err) = accounts::record_failure(&state.db, &id, Track::Crawl, &message).await {
                warn!("failed to persist failure of {}: {}", id, db_err);
            }
            let _ = state.events.send(SyncEvent::Failed { account_id: id.clone(), mode, message: message.clone() });
            ticket.fail(message);
            if matches!(e, SyncError::SessionExpired(_)) {
                if let Err(e) = trigger_cookie_refresh(&state, &id) {
                    warn!("could not schedule session refresh for {}: {}", id, e);
                }
            }
        }
    }
}

async fn run_session_refresh(state: AppState, entry: AccountEntry, backend: Backend, ticket: JobTicket) {
    let id = entry.id().to_string();
    if let Err(e) = accounts::record_status(&state.db, &id, Track::Auth, "refreshing").await {
        warn!("failed to persist session status of {}: {}", id, e);
    }
    match backend.refresh_session(&entry.account).await {
        Ok(()) => {
            info!("session of {} refreshed", id);
            state.metrics.record_session_refresh(true);
            if let Err(e) = accounts::record_status(&state.db, &id, Track::Auth, "idle").await {
                warn!("failed to persist session status of {}: {}", id, e);
            }
            let _ = state.events.send(SyncEvent::SessionRefreshed { account_id: id });
            ticket.succeed();
        }
        Err(e) => {
            let message = e.to_string();
            error!("session refresh of {} failed: {}", id, message);
            state.metrics.record_session_refresh(false);
            if let Err(db_err) = accounts::record_failure(&state.db, &id, Track::Auth, &message).await {
                warn!("failed to persist session failure of {}: {}", id, db_err);
            }
            let _ = state.events.send(SyncEvent::SessionFailed { account_id: id, message: message.clone() });
            ticket.fail(message);
        }
    }
}

/// Login, then full sync. Used once per account at startup.
async fn initial_sync(state: AppState, entry: AccountEntry) {
    let id = entry.id().to_string();
    let Ok(backend) = entry.backend().cloned() else {
        warn!("skipping initial sync of {}: no connector", id);
        return;
    };
    if backend.needs_session() {
        if let Some(ticket) = claim(&state, &id, Track::Auth) {
            run_session_refresh(state.clone(), entry.clone(), backend.clone(), ticket).await;
        }
    }
    if state.shutdown.is_cancelled() {
        return;
    }
    if let Err(e) = trigger_full_sync(&state, &id) {
        warn!("initial sync of {} not started: {}", id, e);
    }
}

/// Records configured accounts in the database, drops removed ones and applies the
/// hidden-id list to already cached nodes.
pub async fn bootstrap(state: &AppState) -> anyhow::Result<()> {
    accounts::reconcile(&state.db, &state.accounts).await?;
    let hidden = state.config.hidden_set();
    for entry in state.accounts.iter() {
        state.store.apply_hidden(entry.id(), &hidden).await?;
        let purged = state.store.purge_deleted(entry.id()).await?;
        if purged > 0 {
            info!("purged {} tombstoned nodes of {}", purged, entry.id());
        }
    }
    info!("{} account(s) ready", state.accounts.len());
    Ok(())
}

fn spawn_ticker<F>(state: &AppState, period: Duration, name: &'static str, mut tick: F) -> JoinHandle<()>
where
    F: FnMut(&AppState) + Send + 'static,
{
    let state = state.clone();
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = ticker.tick() => tick(&state),
            }
        }
        info!("{} scheduler stopped", name);
    })
}

/// Starts the startup sync and the periodic sync, session and maintenance tickers.
/// Every task stops when `state.shutdown` is cancelled.
pub fn spawn_scheduler(state: &AppState) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();
    let sync_cfg = &state.config.sync;

    if sync_cfg.sync_on_startup {
        for entry in state.accounts.iter() {
            handles.push(tokio::spawn(initial_sync(state.clone(), entry.clone())));
        }
    }

    if sync_cfg.full_sync_interval_secs > 0 {
        let period = Duration::from_secs(sync_cfg.full_sync_interval_secs);
        handles.push(spawn_ticker(state, period, "full sync", |st| {
            trigger_all(st, trigger_full_sync);
        }));
    }

    if sync_cfg.cookie_refresh_interval_secs > 0 {
        let period = Duration::from_secs(sync_cfg.cookie_refresh_interval_secs);
        handles.push(spawn_ticker(state, period, "session refresh", |st| {
            trigger_all(st, trigger_cookie_refresh);
        }));
    }

    handles.push(spawn_ticker(state, MAINTENANCE_INTERVAL, "maintenance", |st| {
        let limiter = st.rate_limiter.clone();
        tokio::spawn(async move {
            limiter.cleanup_all().await;
            global_limiter().cleanup_old_entries().await;
        });
    }));

    handles
}
