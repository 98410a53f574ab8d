//! SQLite-backed change journal
//!
//! The host's file watcher appends events with [`SqliteChangeJournal::record`];
//! the catalog engine reads them through the [`ChangeLog`] trait. Rows older
//! than the accepted checkpoint may be pruned; a reader whose checkpoint
//! predates the pruned range gets a `ChangeTrackingLost` event.

use async_trait::async_trait;
use bridge_traits::{
    change_log::{ChangeBatch, ChangeCheckpoint, ChangeEvent, ChangeKind, ChangeLog},
    error::{BridgeError, Result},
};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use std::path::PathBuf;
use tracing::{debug, warn};

const CREATE_JOURNAL_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS change_journal (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scope TEXT NOT NULL,
        kind TEXT NOT NULL,
        path TEXT NOT NULL,
        previous_path TEXT,
        is_folder INTEGER NOT NULL,
        size INTEGER,
        modified_at INTEGER,
        recorded_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_change_journal_scope ON change_journal(scope, id)",
    r#"
    CREATE TABLE IF NOT EXISTS change_journal_state (
        scope TEXT NOT NULL,
        name TEXT NOT NULL,
        value INTEGER NOT NULL,
        PRIMARY KEY (scope, name)
    )
    "#,
];

const STATE_ACCEPTED: &str = "accepted";
const STATE_PRUNED: &str = "pruned_through";

/// Change journal for one scope (typically one catalog partition).
pub struct SqliteChangeJournal {
    pool: SqlitePool,
    scope: String,
}

impl SqliteChangeJournal {
    /// Open the journal stored in `db_path` for `scope`
    pub async fn open(db_path: PathBuf, scope: impl Into<String>) -> Result<Self> {
        let pool = crate::open_sqlite(&db_path).await?;
        Self::with_pool(pool, scope).await
    }

    /// In-memory journal (for testing)
    pub async fn in_memory(scope: impl Into<String>) -> Result<Self> {
        let pool = crate::open_sqlite_in_memory().await?;
        Self::with_pool(pool, scope).await
    }

    /// Share an existing pool; several scopes can live in one database.
    pub async fn with_pool(pool: SqlitePool, scope: impl Into<String>) -> Result<Self> {
        for statement in CREATE_JOURNAL_TABLES.iter().copied() {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(db_error("create journal tables"))?;
        }
        Ok(Self {
            pool,
            scope: scope.into(),
        })
    }

    /// Append an event and return its position.
    pub async fn record(&self, event: &ChangeEvent) -> Result<ChangeCheckpoint> {
        let result = sqlx::query(
            r#"
            INSERT INTO change_journal
                (scope, kind, path, previous_path, is_folder, size, modified_at, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&self.scope)
        .bind(event.kind.as_str())
        .bind(event.path.to_string_lossy().into_owned())
        .bind(
            event
                .previous_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        )
        .bind(event.is_folder)
        .bind(event.size.map(|s| s as i64))
        .bind(event.modified_at.map(|t| t.timestamp_millis()))
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(db_error("record change"))?;

        let id = result.last_insert_rowid() as u64;
        debug!(scope = %self.scope, id, kind = event.kind.as_str(), "Recorded change");
        Ok(ChangeCheckpoint(id))
    }

    /// Drop every row up to and including `through`.
    ///
    /// Readers whose checkpoint is older than `through` will see
    /// `ChangeTrackingLost` on their next read.
    pub async fn prune_through(&self, through: ChangeCheckpoint) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM change_journal WHERE scope = ? AND id <= ?")
            .bind(&self.scope)
            .bind(through.0 as i64)
            .execute(&self.pool)
            .await
            .map_err(db_error("prune journal"))?
            .rows_affected();

        self.raise_state(STATE_PRUNED, through).await?;
        debug!(scope = %self.scope, through = through.0, deleted, "Pruned change journal");
        Ok(deleted)
    }

    async fn state(&self, name: &str) -> Result<ChangeCheckpoint> {
        let value: Option<i64> = sqlx::query_scalar(
            "SELECT value FROM change_journal_state WHERE scope = ? AND name = ?",
        )
        .bind(&self.scope)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("read journal state"))?;

        Ok(ChangeCheckpoint(value.unwrap_or(0) as u64))
    }

    /// Store `value` unless the stored one is already larger.
    async fn raise_state(&self, name: &str, value: ChangeCheckpoint) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO change_journal_state (scope, name, value)
            VALUES (?, ?, ?)
            ON CONFLICT(scope, name) DO UPDATE SET
                value = MAX(value, excluded.value)
            "#,
        )
        .bind(&self.scope)
        .bind(name)
        .bind(value.0 as i64)
        .execute(&self.pool)
        .await
        .map_err(db_error("write journal state"))?;
        Ok(())
    }
}

fn db_error(action: &'static str) -> impl Fn(sqlx::Error) -> BridgeError {
    move |e| BridgeError::DatabaseError(format!("Failed to {}: {}", action, e))
}

fn event_from_row(row: &sqlx::sqlite::SqliteRow) -> Option<ChangeEvent> {
    let kind: String = row.get("kind");
    let Some(kind) = ChangeKind::parse(&kind) else {
        warn!(kind = %kind, "Unknown change kind in journal");
        return None;
    };

    let previous_path: Option<String> = row.get("previous_path");
    let size: Option<i64> = row.get("size");
    let modified_at: Option<i64> = row.get("modified_at");

    Some(ChangeEvent {
        kind,
        path: PathBuf::from(row.get::<String, _>("path")),
        previous_path: previous_path.map(PathBuf::from),
        is_folder: row.get("is_folder"),
        size: size.map(|s| s as u64),
        modified_at: modified_at.and_then(DateTime::<Utc>::from_timestamp_millis),
    })
}

#[async_trait]
impl ChangeLog for SqliteChangeJournal {
    async fn checkpoint(&self) -> Result<ChangeCheckpoint> {
        self.state(STATE_ACCEPTED).await
    }

    async fn head(&self) -> Result<ChangeCheckpoint> {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(id) FROM change_journal WHERE scope = ?")
                .bind(&self.scope)
                .fetch_one(&self.pool)
                .await
                .map_err(db_error("read journal head"))?;

        let pruned = self.state(STATE_PRUNED).await?;
        Ok(ChangeCheckpoint(max.unwrap_or(0) as u64).max(pruned))
    }

    async fn read_batch_since(&self, checkpoint: ChangeCheckpoint) -> Result<ChangeBatch> {
        let pruned = self.state(STATE_PRUNED).await?;
        if checkpoint < pruned {
            warn!(
                scope = %self.scope,
                checkpoint = checkpoint.0,
                pruned = pruned.0,
                "Checkpoint predates retained journal"
            );
            return Ok(ChangeBatch {
                events: vec![ChangeEvent::tracking_lost()],
                through: self.head().await?,
            });
        }

        let rows = sqlx::query(
            r#"
            SELECT id, kind, path, previous_path, is_folder, size, modified_at
            FROM change_journal
            WHERE scope = ? AND id > ?
            ORDER BY id
            "#,
        )
        .bind(&self.scope)
        .bind(checkpoint.0 as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("read journal"))?;

        let through = rows
            .last()
            .map(|row| ChangeCheckpoint(row.get::<i64, _>("id") as u64))
            .unwrap_or(checkpoint);
        let events = rows.iter().filter_map(event_from_row).collect();

        Ok(ChangeBatch { events, through })
    }

    async fn accept_changes(&self, through: ChangeCheckpoint) -> Result<()> {
        self.raise_state(STATE_ACCEPTED, through).await?;
        debug!(scope = %self.scope, through = through.0, "Accepted changes");
        Ok(())
    }
}
