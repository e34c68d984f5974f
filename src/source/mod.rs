//! Remote directory sources.
//!
//! Every storage backend an account can point at is one variant of [`Backend`]. The
//! filesystem backend is built in ([`NativeDrive`]); cloud drives are reached through
//! [`RemoteDrive`] connectors registered per [`DriveKind`] in a [`DriveRegistry`]. The
//! wire protocol of each cloud provider lives behind that trait.

pub mod native;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::accounts::Account;

pub use native::NativeDrive;

/// Closed set of supported backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriveKind {
    #[serde(rename = "native")]
    Native,
    #[serde(rename = "cloud189")]
    Cloud189,
    #[serde(rename = "teambition")]
    Teambition,
    #[serde(rename = "teambition-us")]
    TeambitionUs,
    #[serde(rename = "aliyundrive")]
    AliyunDrive,
}

impl DriveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriveKind::Native => "native",
            DriveKind::Cloud189 => "cloud189",
            DriveKind::Teambition => "teambition",
            DriveKind::TeambitionUs => "teambition-us",
            DriveKind::AliyunDrive => "aliyundrive",
        }
    }
}

impl fmt::Display for DriveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immediate child of a remote folder, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub is_folder: bool,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
}

impl RemoteEntry {
    pub fn folder(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), is_folder: true, size: 0, modified_at: None }
    }

    pub fn file(id: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self { id: id.into(), name: name.into(), is_folder: false, size, modified_at: None }
    }

    pub fn modified(mut self, at: DateTime<Utc>) -> Self {
        self.modified_at = Some(at);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The backend could not be reached or answered with an error.
    #[error("remote unavailable: {0}")]
    Unavailable(String),
    /// The stored session/cookie is no longer accepted.
    #[error("session expired: {0}")]
    SessionExpired(String),
    /// The requested folder or file does not exist remotely.
    #[error("remote item not found: {0}")]
    NotFound(String),
}

/// Connector for one cloud-drive provider.
///
/// Implementations own the provider's wire protocol and session handles. All methods
/// must be safe to retry.
#[async_trait]
pub trait RemoteDrive: Send + Sync {
    /// Immediate children of `folder_id`.
    async fn list_children(&self, account: &Account, folder_id: &str) -> Result<Vec<RemoteEntry>, SourceError>;

    /// Short-lived download URL for a file.
    async fn download_url(&self, account: &Account, file_id: &str) -> Result<String, SourceError>;

    /// Re-establish the provider session using the account credentials.
    async fn refresh_session(&self, account: &Account) -> Result<(), SourceError>;
}

/// Backend bound to an account, selected once when accounts are loaded.
#[derive(Clone)]
pub enum Backend {
    Native(NativeDrive),
    Cloud189(Arc<dyn RemoteDrive>),
    Teambition(Arc<dyn RemoteDrive>),
    TeambitionUs(Arc<dyn RemoteDrive>),
    AliyunDrive(Arc<dyn RemoteDrive>),
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Backend({})", self.kind())
    }
}

impl Backend {
    pub fn kind(&self) -> DriveKind {
        match self {
            Backend::Native(_) => DriveKind::Native,
            Backend::Cloud189(_) => DriveKind::Cloud189,
            Backend::Teambition(_) => DriveKind::Teambition,
            Backend::TeambitionUs(_) => DriveKind::TeambitionUs,
            Backend::AliyunDrive(_) => DriveKind::AliyunDrive,
        }
    }

    /// Connector of a cloud backend; `None` for the filesystem.
    pub fn remote(&self) -> Option<&Arc<dyn RemoteDrive>> {
        match self {
            Backend::Native(_) => None,
            Backend::Cloud189(d) | Backend::Teambition(d) | Backend::TeambitionUs(d) | Backend::AliyunDrive(d) => {
                Some(d)
            }
        }
    }

    /// Whether the backend keeps a login session that needs periodic refresh.
    pub fn needs_session(&self) -> bool {
        self.remote().is_some()
    }

    /// Backends able to bundle whole folders for download.
    pub fn supports_folder_download(&self) -> bool {
        matches!(self, Backend::Native(_) | Backend::Cloud189(_))
    }

    pub async fn list_children(&self, account: &Account, folder_id: &str) -> Result<Vec<RemoteEntry>, SourceError> {
        match self {
            Backend::Native(drive) => drive.list_children(&account.root_id, folder_id).await,
            _ => match self.remote() {
                Some(drive) => drive.list_children(account, folder_id).await,
                None => Err(SourceError::Unavailable(format!("no connector for {}", self.kind()))),
            },
        }
    }

    pub async fn refresh_session(&self, account: &Account) -> Result<(), SourceError> {
        match self.remote() {
            Some(drive) => drive.refresh_session(account).await,
            None => Ok(()),
        }
    }
}

/// Connectors available to this process, keyed by backend kind.
#[derive(Clone)]
pub struct DriveRegistry {
    native: NativeDrive,
    connectors: HashMap<DriveKind, Arc<dyn RemoteDrive>>,
}

impl DriveRegistry {
    pub fn new(native: NativeDrive) -> Self {
        Self { native, connectors: HashMap::new() }
    }

    pub fn with_connector(mut self, kind: DriveKind, drive: Arc<dyn RemoteDrive>) -> Self {
        if kind == DriveKind::Native {
            tracing::warn!("ignoring connector registered for the native backend");
            return self;
        }
        self.connectors.insert(kind, drive);
        self
    }

    /// Builds the backend for `kind`, or `None` when no connector is registered for it.
    pub fn backend_for(&self, kind: DriveKind) -> Option<Backend> {
        if kind == DriveKind::Native {
            return Some(Backend::Native(self.native.clone()));
        }
        let drive = self.connectors.get(&kind)?.clone();
        Some(match kind {
            DriveKind::Cloud189 => Backend::Cloud189(drive),
            DriveKind::Teambition => Backend::Teambition(drive),
            DriveKind::TeambitionUs => Backend::TeambitionUs(drive),
            DriveKind::AliyunDrive => Backend::AliyunDrive(drive),
            DriveKind::Native => unreachable!("native handled above"),
        })
    }
}
