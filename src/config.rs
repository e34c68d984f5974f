use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::query::{HiddenSet, PasswordGate};
use crate::source::DriveKind;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub full_sync_interval_secs: u64,
    pub cookie_refresh_interval_secs: u64,
    pub sync_on_startup: bool,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    pub hide_file_ids: String,
    pub pwd_dir_ids: String,
    pub readme_max_bytes: usize,
    /// Upper bound for one remote README fetch, connect included.
    pub readme_timeout_secs: u64,
    pub search_limit: i64,
    pub api_token: String,
    /// Comma separated referrer hosts allowed to embed listings and downloads.
    /// Empty allows every referrer.
    #[serde(default)]
    pub only_referrer: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NativeConfig {
    #[serde(default)]
    pub excludes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    pub enable_hsts: Option<bool>,
    pub hsts_max_age: Option<u64>,
    pub hsts_include_subdomains: Option<bool>,
    pub csp: Option<String>,
}

/// One configured storage account. Credentials stay in memory and are never written to SQLite.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub mode: DriveKind,
    pub root_id: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub native: NativeConfig,
    pub security: Option<SecurityConfig>,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

impl AppConfig {
    pub fn hidden_set(&self) -> HiddenSet {
        HiddenSet::parse(&self.index.hide_file_ids)
    }

    /// Parsed password gate. `validate` has already rejected malformed pairs, so the
    /// fallback to an empty gate only triggers for hand-built configs in tests.
    pub fn password_gate(&self) -> PasswordGate {
        PasswordGate::parse(&self.index.pwd_dir_ids).unwrap_or_default()
    }

    pub fn allowed_referrers(&self) -> Vec<String> {
        self.index
            .only_referrer
            .split(',')
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        let defaults: &str = include_str!("../config/default.toml");
        match ::config::Config::builder()
            .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(app_cfg) => app_cfg,
                Err(e) => {
                    eprintln!("FATAL: Failed to deserialize default config: {}", e);
                    panic!("Failed to deserialize default config: {}", e);
                }
            },
            Err(e) => {
                eprintln!("FATAL: Failed to parse default config: {}", e);
                panic!("Failed to parse default config: {}", e);
            }
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        // Mirror defaults from config/default.toml
        Self {
            full_sync_interval_secs: 21600,
            cookie_refresh_interval_secs: 3600,
            sync_on_startup: true,
            batch_size: 80,
        }
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let defaults: &str = include_str!("../config/default.toml");
    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
        // Optional local file: cloudindex.toml (in CWD)
        .add_source(::config::File::with_name("cloudindex").required(false));

    if let Ok(custom_path) = std::env::var("CLOUDINDEX_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(::config::Environment::with_prefix("CLOUDINDEX").separator("__"));

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

/// Largest batch that keeps one multi-row node INSERT under SQLite's 999 bind variables.
pub const MAX_BATCH_SIZE: usize = 999 / crate::cache::NODE_BINDS_PER_ROW;

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    // Server
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.server.port);
    }

    // Sync
    if cfg.sync.batch_size == 0 {
        return Err(anyhow::anyhow!("sync.batch_size must be > 0"));
    }
    if cfg.sync.batch_size > MAX_BATCH_SIZE {
        return Err(anyhow::anyhow!("sync.batch_size must be <= {}", MAX_BATCH_SIZE));
    }

    // Index
    if cfg.index.readme_timeout_secs == 0 {
        return Err(anyhow::anyhow!("index.readme_timeout_secs must be > 0"));
    }
    if cfg.index.search_limit <= 0 {
        return Err(anyhow::anyhow!("index.search_limit must be > 0"));
    }
    PasswordGate::parse(&cfg.index.pwd_dir_ids)
        .map_err(|e| anyhow::anyhow!("invalid index.pwd_dir_ids: {}", e))?;

    // Native excludes must compile
    for pattern in &cfg.native.excludes {
        globset::Glob::new(pattern)
            .map_err(|e| anyhow::anyhow!("invalid native.excludes pattern {}: {}", pattern, e))?;
    }

    // Accounts
    let mut seen = HashSet::new();
    for account in &cfg.accounts {
        if account.id.trim().is_empty() {
            return Err(anyhow::anyhow!("accounts[].id must not be empty"));
        }
        if !seen.insert(account.id.as_str()) {
            return Err(anyhow::anyhow!("duplicate account id: {}", account.id));
        }
        if account.root_id.trim().is_empty() {
            return Err(anyhow::anyhow!("account {} has an empty root_id", account.id));
        }
    }
    if cfg.accounts.iter().filter(|a| a.default).count() > 1 {
        return Err(anyhow::anyhow!("at most one account may be marked default"));
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        let p = Path::new(path);
        if let Some(parent) = p.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}
