use sqlx::SqlitePool;

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    // Best-effort tuning; an in-memory database rejects some of these.
    for pragma in ["PRAGMA journal_mode=WAL;", "PRAGMA synchronous=NORMAL;", "PRAGMA busy_timeout=10000;"] {
        if let Err(e) = sqlx::query(pragma).execute(pool).await {
            tracing::warn!("Failed to apply {}: {}", pragma, e);
        }
    }

    // accounts: one row per configured account, status only (credentials stay in config)
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            mode TEXT NOT NULL,
            root_id TEXT NOT NULL,
            is_default INTEGER NOT NULL DEFAULT 0,
            seq INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'idle',
            cookie_status TEXT NOT NULL DEFAULT 'idle',
            files_count INTEGER NOT NULL DEFAULT 0,
            last_synced_at TEXT NULL,
            last_error TEXT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
        )"#,
    )
    .execute(pool)
    .await?;

    // nodes: cached directory tree, one row per (account, remote id). No unique path:
    // remote drives allow sibling name collisions.
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS nodes (
            account_id TEXT NOT NULL,
            file_id TEXT NOT NULL,
            parent_id TEXT NOT NULL,
            name TEXT NOT NULL,
            is_folder INTEGER NOT NULL,
            size INTEGER NOT NULL DEFAULT 0,
            path TEXT NOT NULL,
            parent_path TEXT NOT NULL,
            media_type TEXT NOT NULL,
            modified_at INTEGER NULL,
            hidden INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            PRIMARY KEY (account_id, file_id)
        )"#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        ("idx_nodes_parent_path", "CREATE INDEX IF NOT EXISTS idx_nodes_parent_path ON nodes(account_id, parent_path, deleted, hidden)"),
        ("idx_nodes_path", "CREATE INDEX IF NOT EXISTS idx_nodes_path ON nodes(account_id, path)"),
        ("idx_nodes_parent_id", "CREATE INDEX IF NOT EXISTS idx_nodes_parent_id ON nodes(account_id, parent_id)"),
        ("idx_nodes_name", "CREATE INDEX IF NOT EXISTS idx_nodes_name ON nodes(account_id, name)"),
        // count_live, purge_deleted and visibility-filtered search
        ("idx_nodes_visibility", "CREATE INDEX IF NOT EXISTS idx_nodes_visibility ON nodes(account_id, deleted, hidden)"),
    ];
    for (name, query) in indexes {
        if let Err(e) = sqlx::query(query).execute(pool).await {
            tracing::warn!("Failed to create index {}: {}", name, e);
        }
    }

    // Nothing can be syncing right after startup.
    sqlx::query("UPDATE accounts SET status = 'idle', cookie_status = 'idle' WHERE status != 'idle' OR cookie_status != 'idle'")
        .execute(pool)
        .await?;

    Ok(())
}
