use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::accounts::AccountDirectory;
use crate::cache::NodeStore;
use crate::config::AppConfig;
use crate::download::DownloadResolver;
use crate::metrics::Metrics;
use crate::middleware::EndpointRateLimiter;
use crate::query::{QueryService, ReadmeCache};
use crate::source::DriveRegistry;
use crate::sync::guard::SessionGuard;
use crate::sync::Orchestrator;
use crate::types::SyncEvent;

/// Buffered events per subscriber before slow SSE clients start lagging.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The shared application state.
///
/// Cloned into every handler and background job. Everything mutable lives behind the
/// database, the guard's mutex or atomics, so clones observe the same process state.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: sqlx::SqlitePool,
    pub config: Arc<AppConfig>,
    /// Configured accounts with their bound backends.
    pub accounts: Arc<AccountDirectory>,
    pub store: NodeStore,
    /// Per-account job exclusion (crawl and session tracks).
    pub guard: SessionGuard,
    pub orchestrator: Orchestrator,
    pub query: QueryService,
    pub downloads: DownloadResolver,
    /// Sync progress for SSE subscribers.
    pub events: broadcast::Sender<SyncEvent>,
    pub metrics: Metrics,
    pub rate_limiter: EndpointRateLimiter,
    /// Cancelled on shutdown; running crawls stop at the next folder boundary.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wires the services together. Per-endpoint limits:
    /// - 600 listings per minute
    /// - 120 searches per minute
    /// - 300 download resolutions per minute
    /// - 30 per minute for each admin trigger
    pub fn new(db: sqlx::SqlitePool, config: AppConfig, drives: DriveRegistry) -> Self {
        let config = Arc::new(config);
        let accounts = Arc::new(AccountDirectory::load(&config.accounts, &drives));
        let store = NodeStore::new(db.clone());
        let gate = Arc::new(config.password_gate());
        let hidden = Arc::new(config.hidden_set());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();

        let downloads = DownloadResolver::new(store.clone(), gate.clone());
        let query = QueryService::new(
            store.clone(),
            gate,
            downloads.clone(),
            ReadmeCache::new(config.index.readme_max_bytes, Duration::from_secs(config.index.readme_timeout_secs)),
            config.index.search_limit,
        );
        let orchestrator =
            Orchestrator::new(store.clone(), hidden, config.sync.batch_size, events.clone(), shutdown.clone());

        let rate_limiter = EndpointRateLimiter::new().with_limits(vec![
            ("/api/accounts/{id}/list", 600, 60),
            ("/api/accounts/{id}/search", 120, 60),
            ("/api/accounts/{id}/download", 300, 60),
            ("/api/admin/accounts/{id}/sync", 30, 60),
            ("/api/admin/accounts/{id}/refresh", 30, 60),
            ("/api/admin/accounts/{id}/cookie", 30, 60),
            ("/api/admin/sync-all", 30, 60),
            ("/api/admin/refresh-cookies", 30, 60),
        ]);

        Self {
            db,
            config,
            accounts,
            store,
            guard: SessionGuard::new(),
            orchestrator,
            query,
            downloads,
            events,
            metrics: Metrics::new(),
            rate_limiter,
            shutdown,
        }
    }
}
