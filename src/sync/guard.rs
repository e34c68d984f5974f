//! Per-account exclusion for background jobs.
//!
//! Each account has two independent tracks: crawling (full and incremental sync) and
//! authentication (session refresh). At most one job runs per track and account.
//! Claiming is an atomic check-and-set under one mutex, and the returned [`JobTicket`]
//! releases the track when finished or dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    Crawl,
    Auth,
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Track::Crawl => f.write_str("sync"),
            Track::Auth => f.write_str("session refresh"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running { since: DateTime<Utc> },
    /// Last job failed. Does not block the next one.
    Failed { message: String, at: DateTime<Utc> },
}

impl JobState {
    /// Status label persisted on the account row.
    pub fn label(&self, track: Track) -> &'static str {
        match (self, track) {
            (JobState::Idle, _) => "idle",
            (JobState::Running { .. }, Track::Crawl) => "syncing",
            (JobState::Running { .. }, Track::Auth) => "refreshing",
            (JobState::Failed { .. }, _) => "error",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Running { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    #[error("{track} already in progress for account {account_id}")]
    Busy { account_id: String, track: Track },
}

type Slots = HashMap<(String, Track), JobState>;

#[derive(Clone, Default)]
pub struct SessionGuard {
    slots: Arc<Mutex<Slots>>,
}

impl SessionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // A panic while holding the lock cannot leave a slot half written.
        self.slots.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Claims `track` for `account_id`, or reports `Busy` when a job already runs there.
    pub fn try_begin(&self, account_id: &str, track: Track) -> Result<JobTicket, GuardError> {
        let mut slots = self.lock();
        let key = (account_id.to_string(), track);
        if slots.get(&key).is_some_and(JobState::is_running) {
            return Err(GuardError::Busy { account_id: account_id.to_string(), track });
        }
        slots.insert(key, JobState::Running { since: Utc::now() });
        Ok(JobTicket { guard: self.clone(), account_id: account_id.to_string(), track, finished: false })
    }

    pub fn state(&self, account_id: &str, track: Track) -> JobState {
        self.lock().get(&(account_id.to_string(), track)).cloned().unwrap_or(JobState::Idle)
    }

    pub fn is_running(&self, account_id: &str, track: Track) -> bool {
        self.state(account_id, track).is_running()
    }

    /// Number of jobs running across all accounts and tracks.
    pub fn running_count(&self) -> usize {
        self.lock().values().filter(|s| s.is_running()).count()
    }

    fn set(&self, account_id: &str, track: Track, state: JobState) {
        self.lock().insert((account_id.to_string(), track), state);
    }
}

/// Proof of a claimed track. Dropping it without `succeed`/`fail` resets the track to idle.
#[must_use = "dropping the ticket releases the track immediately"]
pub struct JobTicket {
    guard: SessionGuard,
    account_id: String,
    track: Track,
    finished: bool,
}

impl JobTicket {
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn track(&self) -> Track {
        self.track
    }

    pub fn succeed(mut self) {
        self.finished = true;
        self.guard.set(&self.account_id, self.track, JobState::Idle);
    }

    pub fn fail(mut self, message: impl Into<String>) {
        self.finished = true;
        let state = JobState::Failed { message: message.into(), at: Utc::now() };
        self.guard.set(&self.account_id, self.track, state);
    }
}

impl Drop for JobTicket {
    fn drop(&mut self) {
        if !self.finished {
            self.guard.set(&self.account_id, self.track, JobState::Idle);
        }
    }
}

impl fmt::Debug for JobTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobTicket").field("account_id", &self.account_id).field("track", &self.track).finish()
    }
}
