//! SQLite-backed node cache.
//!
//! Each account's directory tree is stored as rows of `nodes`, keyed by
//! `(account_id, file_id)`. Rows carry both `parent_id` (for subtree walks) and the
//! denormalised `path`/`parent_path` (for listing by path). Tombstoned rows keep
//! `deleted = 1` until a full resync or an explicit purge removes them.

pub mod media;

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};

use crate::query::HiddenSet;
use crate::source::RemoteEntry;

pub use media::MediaType;

/// Bound parameters per row in the node INSERT.
pub const NODE_BINDS_PER_ROW: usize = 11;

/// Ids per `IN (...)` list, below SQLite's 999 bind variables with room for the account id.
const ID_CHUNK: usize = 900;

const LIKE_ESCAPE: char = '!';

const NODE_COLUMNS: &str =
    "file_id, parent_id, name, is_folder, size, path, parent_path, media_type, modified_at, hidden, deleted";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub file_id: String,
    pub parent_id: String,
    pub name: String,
    pub is_folder: bool,
    pub size: i64,
    pub path: String,
    pub parent_path: String,
    pub media_type: MediaType,
    pub modified_at: Option<DateTime<Utc>>,
    pub hidden: bool,
    pub deleted: bool,
}

impl Node {
    /// The account root: path `/`, no parent.
    pub fn root(root_id: &str) -> Self {
        Self {
            file_id: root_id.to_string(),
            parent_id: String::new(),
            name: String::new(),
            is_folder: true,
            size: 0,
            path: "/".to_string(),
            parent_path: String::new(),
            media_type: MediaType::Folder,
            modified_at: None,
            hidden: false,
            deleted: false,
        }
    }

    /// Node for a child observed while listing the folder `parent_id` at `parent_path`.
    pub fn observed(entry: &RemoteEntry, parent_id: &str, parent_path: &str, hidden: &HiddenSet) -> Self {
        Self {
            file_id: entry.id.clone(),
            parent_id: parent_id.to_string(),
            name: entry.name.clone(),
            is_folder: entry.is_folder,
            size: i64::try_from(entry.size).unwrap_or(i64::MAX),
            path: join_path(parent_path, &entry.name),
            parent_path: parent_path.to_string(),
            media_type: MediaType::classify(&entry.name, entry.is_folder),
            modified_at: entry.modified_at,
            hidden: hidden.contains(&entry.id),
            deleted: false,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_empty()
    }
}

/// Which rows a read may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Not deleted and not hidden. What end users see.
    Visible,
    /// Not deleted; hidden rows included.
    Live,
    /// Everything, tombstones included.
    All,
}

impl Visibility {
    fn filter(self) -> &'static str {
        match self {
            Visibility::Visible => " AND deleted = 0 AND hidden = 0",
            Visibility::Live => " AND deleted = 0",
            Visibility::All => "",
        }
    }
}

/// Canonical form of a user supplied path: leading `/`, no trailing `/`, no empty segments.
pub fn normalize_path(raw: &str) -> String {
    let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    if segments.is_empty() {
        return "/".to_string();
    }
    format!("/{}", segments.join("/"))
}

/// `/` has no parent (empty string); top level entries have parent `/`.
pub fn parent_path(path: &str) -> String {
    if path == "/" || path.is_empty() {
        return String::new();
    }
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

pub fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" || parent.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

pub fn escape_like_pattern(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | LIKE_ESCAPE) {
            out.push(LIKE_ESCAPE);
        }
        out.push(ch);
    }
    out
}

fn node_from_row(row: &SqliteRow) -> Result<Node, sqlx::Error> {
    let media: String = row.try_get("media_type")?;
    let modified: Option<i64> = row.try_get("modified_at")?;
    Ok(Node {
        file_id: row.try_get("file_id")?,
        parent_id: row.try_get("parent_id")?,
        name: row.try_get("name")?,
        is_folder: row.try_get::<i64, _>("is_folder")? != 0,
        size: row.try_get("size")?,
        path: row.try_get("path")?,
        parent_path: row.try_get("parent_path")?,
        media_type: MediaType::parse(&media),
        modified_at: modified.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        hidden: row.try_get::<i64, _>("hidden")? != 0,
        deleted: row.try_get::<i64, _>("deleted")? != 0,
    })
}

/// Inserts or updates `nodes` in multi-row statements of at most `batch_size` rows.
///
/// Every written row is left live (`deleted = 0`). Runs on the caller's connection so it
/// can join an open transaction.
pub async fn upsert_batch(
    conn: &mut SqliteConnection,
    account_id: &str,
    nodes: &[Node],
    batch_size: usize,
) -> Result<u64, sqlx::Error> {
    let chunk = batch_size.clamp(1, 999 / NODE_BINDS_PER_ROW);
    let mut written = 0u64;
    for rows in nodes.chunks(chunk) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO nodes (account_id, file_id, parent_id, name, is_folder, size, path, parent_path, media_type, modified_at, hidden, deleted) ",
        );
        qb.push_values(rows, |mut b, n| {
            b.push_bind(account_id)
                .push_bind(&n.file_id)
                .push_bind(&n.parent_id)
                .push_bind(&n.name)
                .push_bind(if n.is_folder { 1i64 } else { 0i64 })
                .push_bind(n.size)
                .push_bind(&n.path)
                .push_bind(&n.parent_path)
                .push_bind(n.media_type.as_str())
                .push_bind(n.modified_at.map(|t| t.timestamp()))
                .push_bind(if n.hidden { 1i64 } else { 0i64 })
                .push("0");
        });
        qb.push(
            " ON CONFLICT(account_id, file_id) DO UPDATE SET \
             parent_id = excluded.parent_id, name = excluded.name, is_folder = excluded.is_folder, \
             size = excluded.size, path = excluded.path, parent_path = excluded.parent_path, \
             media_type = excluded.media_type, modified_at = excluded.modified_at, \
             hidden = excluded.hidden, deleted = 0, \
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')",
        );
        written += qb.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(written)
}

/// File ids of every live descendant of `root_file_id`, found by walking `parent_id`
/// links. The root itself is not included.
pub async fn collect_descendants(
    conn: &mut SqliteConnection,
    account_id: &str,
    root_file_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let mut frontier = VecDeque::from([root_file_id.to_string()]);
    let mut seen: HashSet<String> = HashSet::from([root_file_id.to_string()]);
    let mut out = Vec::new();

    while let Some(parent) = frontier.pop_front() {
        let rows = sqlx::query(
            "SELECT file_id, is_folder FROM nodes WHERE account_id = ? AND parent_id = ? AND deleted = 0",
        )
        .bind(account_id)
        .bind(&parent)
        .fetch_all(&mut *conn)
        .await?;
        for row in rows {
            let id: String = row.try_get("file_id")?;
            let is_folder = row.try_get::<i64, _>("is_folder")? != 0;
            if !seen.insert(id.clone()) {
                continue;
            }
            if is_folder {
                frontier.push_back(id.clone());
            }
            out.push(id);
        }
    }
    Ok(out)
}

/// Sets `deleted = 1` on the given ids.
pub async fn mark_deleted(conn: &mut SqliteConnection, account_id: &str, ids: &[String]) -> Result<u64, sqlx::Error> {
    let mut affected = 0u64;
    for chunk in ids.chunks(ID_CHUNK) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "UPDATE nodes SET deleted = 1, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now') WHERE account_id = ",
        );
        qb.push_bind(account_id).push(" AND deleted = 0 AND file_id IN (");
        let mut sep = qb.separated(", ");
        for id in chunk {
            sep.push_bind(id);
        }
        qb.push(")");
        affected += qb.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(affected)
}

/// Removes every row of the account.
pub async fn clear_account(conn: &mut SqliteConnection, account_id: &str) -> Result<u64, sqlx::Error> {
    let res = sqlx::query("DELETE FROM nodes WHERE account_id = ?").bind(account_id).execute(&mut *conn).await?;
    Ok(res.rows_affected())
}

/// Read/write handle over the `nodes` table.
#[derive(Clone)]
pub struct NodeStore {
    pool: SqlitePool,
}

impl NodeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn upsert(&self, account_id: &str, nodes: &[Node], batch_size: usize) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let n = upsert_batch(&mut tx, account_id, nodes, batch_size).await?;
        tx.commit().await?;
        Ok(n)
    }

    pub async fn descendants(&self, account_id: &str, root_file_id: &str) -> Result<Vec<String>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        collect_descendants(&mut conn, account_id, root_file_id).await
    }

    /// Tombstones every descendant of `root_file_id`, and the root too when `include_root`.
    pub async fn mark_deleted_subtree(
        &self,
        account_id: &str,
        root_file_id: &str,
        include_root: bool,
    ) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut ids = collect_descendants(&mut tx, account_id, root_file_id).await?;
        if include_root {
            ids.push(root_file_id.to_string());
        }
        let n = mark_deleted(&mut tx, account_id, &ids).await?;
        tx.commit().await?;
        Ok(n)
    }

    /// Physically removes tombstoned rows of the account.
    pub async fn purge_deleted(&self, account_id: &str) -> Result<u64, sqlx::Error> {
        let res = sqlx::query("DELETE FROM nodes WHERE account_id = ? AND deleted = 1")
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    pub async fn clear_account(&self, account_id: &str) -> Result<u64, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        clear_account(&mut conn, account_id).await
    }

    /// Resets the hidden flag of the account and sets it on every id in `hidden`.
    pub async fn apply_hidden(&self, account_id: &str, hidden: &HiddenSet) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE nodes SET hidden = 0 WHERE account_id = ? AND hidden = 1")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;
        let ids: Vec<&str> = hidden.iter().collect();
        for chunk in ids.chunks(ID_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE nodes SET hidden = 1 WHERE account_id = ");
            qb.push_bind(account_id).push(" AND file_id IN (");
            let mut sep = qb.separated(", ");
            for id in chunk {
                sep.push_bind(*id);
            }
            qb.push(")");
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Children of the folder at `parent_path`: folders first, newest first, then by name.
    pub async fn list_children(
        &self,
        account_id: &str,
        parent_path: &str,
        vis: Visibility,
    ) -> Result<Vec<Node>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM nodes WHERE account_id = ? AND parent_path = ?{} \
             ORDER BY is_folder DESC, modified_at DESC, name ASC, file_id ASC",
            NODE_COLUMNS,
            vis.filter()
        );
        let rows = sqlx::query(&sql).bind(account_id).bind(parent_path).fetch_all(&self.pool).await?;
        rows.iter().map(node_from_row).collect()
    }

    /// The node at `path`. When names collide a folder wins, then the lowest file id.
    pub async fn find_by_path(&self, account_id: &str, path: &str, vis: Visibility) -> Result<Option<Node>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM nodes WHERE account_id = ? AND path = ?{} ORDER BY is_folder DESC, file_id ASC LIMIT 1",
            NODE_COLUMNS,
            vis.filter()
        );
        let row = sqlx::query(&sql).bind(account_id).bind(path).fetch_optional(&self.pool).await?;
        row.as_ref().map(node_from_row).transpose()
    }

    pub async fn find_by_id(&self, account_id: &str, file_id: &str, vis: Visibility) -> Result<Option<Node>, sqlx::Error> {
        let sql = format!("SELECT {} FROM nodes WHERE account_id = ? AND file_id = ?{}", NODE_COLUMNS, vis.filter());
        let row = sqlx::query(&sql).bind(account_id).bind(file_id).fetch_optional(&self.pool).await?;
        row.as_ref().map(node_from_row).transpose()
    }

    /// Visible nodes whose name contains `term` (case-insensitive for ASCII).
    pub async fn search_by_name(&self, account_id: &str, term: &str, limit: i64) -> Result<Vec<Node>, sqlx::Error> {
        let pattern = format!("%{}%", escape_like_pattern(term));
        let sql = format!(
            "SELECT {} FROM nodes WHERE account_id = ? AND parent_id != '' AND name LIKE ? ESCAPE '!'{} \
             ORDER BY is_folder DESC, modified_at DESC, name ASC, file_id ASC LIMIT ?",
            NODE_COLUMNS,
            Visibility::Visible.filter()
        );
        let rows = sqlx::query(&sql)
            .bind(account_id)
            .bind(pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(node_from_row).collect()
    }

    /// Live nodes of the account, excluding the root.
    pub async fn count_live(&self, account_id: &str) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM nodes WHERE account_id = ? AND parent_id != '' AND deleted = 0")
            .bind(account_id)
            .fetch_one(&self.pool)
            .await?;
        row.try_get("cnt")
    }

    /// Every row of the account ordered by path, mainly for inspection.
    pub async fn all_nodes(&self, account_id: &str, vis: Visibility) -> Result<Vec<Node>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM nodes WHERE account_id = ?{} ORDER BY path ASC, file_id ASC",
            NODE_COLUMNS,
            vis.filter()
        );
        let rows = sqlx::query(&sql).bind(account_id).fetch_all(&self.pool).await?;
        rows.iter().map(node_from_row).collect()
    }
}
