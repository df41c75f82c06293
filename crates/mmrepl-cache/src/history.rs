//! SQLite implementation of the conflict-history store
//!
//! [`SqliteConflictHistory`] appends in autocommit mode and serves the read
//! side used by operators. [`HistoryTransaction`] appends inside an open
//! transaction so the history row commits or rolls back together with the
//! apply work done on the same connection.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{Executor, Row, Transaction};
use tokio::sync::Mutex;

use mmrepl_core::domain::{
    ConflictRecord, ConflictRecordParts, ConflictResolution, ConflictType, ErrorInfo, Lsn, NodeId,
    TransactionId, Tuple,
};
use mmrepl_core::ports::{IConflictHistory, StoredConflict};

use crate::CacheError;

// ============================================================================
// Value conversion helpers
// ============================================================================

/// Parse a DateTime<Utc> from an RFC 3339 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

fn parse_sysid(s: &str) -> Result<u64, CacheError> {
    s.parse::<u64>().map_err(|e| {
        CacheError::SerializationError(format!("Invalid system identifier '{}': {}", s, e))
    })
}

fn parse_lsn(s: &str) -> Result<Lsn, CacheError> {
    s.parse::<Lsn>()
        .map_err(|e| CacheError::SerializationError(e.to_string()))
}

fn node_from_columns(sysid: &str, timeline: i64, dboid: i64) -> Result<NodeId, CacheError> {
    Ok(NodeId::new(parse_sysid(sysid)?, timeline as u32, dboid as u32))
}

fn tuple_to_text(tuple: Option<&Tuple>) -> Result<Option<String>, CacheError> {
    tuple
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| CacheError::SerializationError(format!("Failed to serialize tuple: {}", e)))
}

fn tuple_from_text(s: Option<String>) -> Result<Option<Tuple>, CacheError> {
    s.map(|text| serde_json::from_str::<Tuple>(&text))
        .transpose()
        .map_err(|e| CacheError::SerializationError(format!("Invalid stored tuple: {}", e)))
}

// ============================================================================
// Row mapping
// ============================================================================

/// Reconstruct a stored conflict from a `conflict_history` row
fn stored_conflict_from_row(row: &SqliteRow) -> Result<StoredConflict, CacheError> {
    let id: i64 = row.get("id");

    let local_node = node_from_columns(
        &row.get::<String, _>("local_node_sysid"),
        row.get("local_node_timeline"),
        row.get("local_node_dboid"),
    )?;
    let remote_node = node_from_columns(
        &row.get::<String, _>("remote_node_sysid"),
        row.get("remote_node_timeline"),
        row.get("remote_node_dboid"),
    )?;

    let origin_sysid: Option<String> = row.get("local_tuple_origin_sysid");
    let local_tuple_origin = match origin_sysid {
        Some(sysid) => Some(node_from_columns(
            &sysid,
            row.get::<Option<i64>, _>("local_tuple_origin_timeline")
                .unwrap_or_default(),
            row.get::<Option<i64>, _>("local_tuple_origin_dboid")
                .unwrap_or_default(),
        )?),
        None => None,
    };

    let conflict_type_str: String = row.get("conflict_type");
    let conflict_type: ConflictType = conflict_type_str
        .parse()
        .map_err(|e: mmrepl_core::domain::DomainError| CacheError::SerializationError(e.to_string()))?;
    let resolution_str: String = row.get("conflict_resolution");
    let resolution: ConflictResolution = resolution_str
        .parse()
        .map_err(|e: mmrepl_core::domain::DomainError| CacheError::SerializationError(e.to_string()))?;

    let error_sqlstate: Option<String> = row.get("error_sqlstate");
    let apply_error = error_sqlstate.map(|sqlstate| ErrorInfo {
        sqlstate,
        message: row
            .get::<Option<String>, _>("error_message")
            .unwrap_or_default(),
        cursor_pos: row.get::<Option<i64>, _>("error_cursorpos").map(|v| v as i32),
        detail: row.get("error_detail"),
        hint: row.get("error_hint"),
        context: row.get("error_context"),
        schema: row.get("error_schemaname"),
        table: row.get("error_tablename"),
        column: row.get("error_columnname"),
        datatype: row.get("error_typename"),
        constraint: row.get("error_constraintname"),
        file: row.get("error_filename"),
        line: row.get::<Option<i64>, _>("error_lineno").map(|v| v as u32),
        function: row.get("error_funcname"),
    });

    let parts = ConflictRecordParts {
        local_node,
        local_conflict_txid: TransactionId::new(row.get::<i64, _>("local_conflict_xid") as u32),
        local_conflict_lsn: parse_lsn(&row.get::<String, _>("local_conflict_lsn"))?,
        local_conflict_time: parse_datetime(&row.get::<String, _>("local_conflict_time"))?,
        object_schema: row.get("object_schema"),
        object_name: row.get("object_name"),
        remote_node,
        remote_txid: row
            .get::<Option<i64>, _>("remote_txid")
            .map_or(TransactionId::INVALID, |x| TransactionId::new(x as u32)),
        remote_commit_time: parse_datetime(&row.get::<String, _>("remote_commit_time"))?,
        remote_commit_lsn: parse_lsn(&row.get::<String, _>("remote_commit_lsn"))?,
        conflict_type,
        resolution,
        local_tuple: tuple_from_text(row.get("local_tuple"))?,
        remote_tuple: tuple_from_text(row.get("remote_tuple"))?,
        local_tuple_null: row.get("local_tuple_null"),
        local_tuple_xmin: row
            .get::<Option<i64>, _>("local_tuple_xmin")
            .map(|x| TransactionId::new(x as u32)),
        local_tuple_origin,
        local_commit_time: parse_optional_datetime(row.get("local_commit_time"))?,
        key_text: row.get("key_text"),
        apply_error,
    };

    Ok(StoredConflict {
        id,
        record: ConflictRecord::from(parts),
    })
}

const INSERT_CONFLICT: &str = "INSERT INTO conflict_history (\
     local_node_sysid, local_node_timeline, local_node_dboid, \
     local_conflict_xid, local_conflict_lsn, local_conflict_time, \
     object_schema, object_name, \
     remote_node_sysid, remote_node_timeline, remote_node_dboid, \
     remote_txid, remote_commit_time, remote_commit_lsn, \
     conflict_type, conflict_resolution, \
     local_tuple, remote_tuple, local_tuple_null, local_tuple_xmin, \
     local_tuple_origin_sysid, local_tuple_origin_timeline, local_tuple_origin_dboid, \
     local_commit_time, key_text, \
     error_message, error_sqlstate, error_cursorpos, error_detail, error_hint, \
     error_context, error_schemaname, error_tablename, \
     error_columnname, error_typename, error_constraintname, \
     error_filename, error_lineno, error_funcname) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
             ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

/// Insert `record` through `executor` and return the new row id
async fn insert_record<'e, E>(executor: E, record: &ConflictRecord) -> Result<i64, CacheError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let local = record.local_node();
    let remote = record.remote_node();
    // An unknown last writer (system id 0) is stored as NULL.
    let origin = record.local_tuple_origin().filter(|n| !n.is_unknown());
    let err = record.apply_error();
    let remote_txid = Some(record.remote_txid()).filter(TransactionId::is_valid);

    let result = sqlx::query(INSERT_CONFLICT)
        .bind(local.system_id.to_string())
        .bind(i64::from(local.timeline_id))
        .bind(i64::from(local.database_id))
        .bind(i64::from(record.local_conflict_txid().as_u32()))
        .bind(record.local_conflict_lsn().to_string())
        .bind(record.local_conflict_time().to_rfc3339())
        .bind(record.object_schema())
        .bind(record.object_name())
        .bind(remote.system_id.to_string())
        .bind(i64::from(remote.timeline_id))
        .bind(i64::from(remote.database_id))
        .bind(remote_txid.map(|x| i64::from(x.as_u32())))
        .bind(record.remote_commit_time().to_rfc3339())
        .bind(record.remote_commit_lsn().to_string())
        .bind(record.conflict_type().as_str())
        .bind(record.resolution().as_str())
        .bind(tuple_to_text(record.local_tuple())?)
        .bind(tuple_to_text(record.remote_tuple())?)
        .bind(record.local_tuple_null())
        .bind(record.local_tuple_xmin().map(|x| i64::from(x.as_u32())))
        .bind(origin.map(|n| n.system_id.to_string()))
        .bind(origin.map(|n| i64::from(n.timeline_id)))
        .bind(origin.map(|n| i64::from(n.database_id)))
        .bind(record.local_commit_time().map(|t| t.to_rfc3339()))
        .bind(record.key_text())
        .bind(err.map(|e| e.message.as_str()))
        .bind(err.map(|e| e.sqlstate.as_str()))
        .bind(err.and_then(|e| e.cursor_pos).map(i64::from))
        .bind(err.and_then(|e| e.detail.as_deref()))
        .bind(err.and_then(|e| e.hint.as_deref()))
        .bind(err.and_then(|e| e.context.as_deref()))
        .bind(err.and_then(|e| e.schema.as_deref()))
        .bind(err.and_then(|e| e.table.as_deref()))
        .bind(err.and_then(|e| e.column.as_deref()))
        .bind(err.and_then(|e| e.datatype.as_deref()))
        .bind(err.and_then(|e| e.constraint.as_deref()))
        .bind(err.and_then(|e| e.file.as_deref()))
        .bind(err.and_then(|e| e.line).map(i64::from))
        .bind(err.and_then(|e| e.function.as_deref()))
        .execute(executor)
        .await?;

    Ok(result.last_insert_rowid())
}

// ============================================================================
// Aggregates
// ============================================================================

/// Conflict counts by type and by resolution
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryStats {
    pub total: i64,
    pub by_type: Vec<(ConflictType, i64)>,
    pub by_resolution: Vec<(ConflictResolution, i64)>,
}

// ============================================================================
// SqliteConflictHistory
// ============================================================================

/// Conflict-history store backed by SQLite
#[derive(Clone)]
pub struct SqliteConflictHistory {
    pool: SqlitePool,
}

impl SqliteConflictHistory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append `record` in its own autocommit transaction
    pub async fn append(&self, record: &ConflictRecord) -> Result<i64, CacheError> {
        let id = insert_record(&self.pool, record).await?;
        tracing::trace!(id, conflict_type = %record.conflict_type(), "Saved conflict");
        Ok(id)
    }

    /// Open a transaction for an apply step
    ///
    /// Conflicts appended through the returned handle become visible only
    /// after [`HistoryTransaction::commit`].
    pub async fn begin(&self) -> Result<HistoryTransaction, CacheError> {
        let tx = self.pool.begin().await?;
        Ok(HistoryTransaction {
            tx: Mutex::new(tx),
        })
    }

    /// Most recent conflicts first
    pub async fn recent(&self, limit: u32) -> Result<Vec<StoredConflict>, CacheError> {
        let rows = sqlx::query("SELECT * FROM conflict_history ORDER BY id DESC LIMIT ?")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(stored_conflict_from_row).collect()
    }

    pub async fn get(&self, id: i64) -> Result<Option<StoredConflict>, CacheError> {
        let row = sqlx::query("SELECT * FROM conflict_history WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(stored_conflict_from_row).transpose()
    }

    pub async fn count(&self) -> Result<i64, CacheError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM conflict_history")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Totals grouped by conflict type and by resolution
    pub async fn stats(&self) -> Result<HistoryStats, CacheError> {
        let total = self.count().await?;

        let type_rows = sqlx::query(
            "SELECT conflict_type AS k, COUNT(*) AS n FROM conflict_history \
             GROUP BY conflict_type ORDER BY n DESC, k",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut by_type = Vec::with_capacity(type_rows.len());
        for row in &type_rows {
            let key: String = row.get("k");
            let t = key
                .parse::<ConflictType>()
                .map_err(|e| CacheError::SerializationError(e.to_string()))?;
            by_type.push((t, row.get::<i64, _>("n")));
        }

        let resolution_rows = sqlx::query(
            "SELECT conflict_resolution AS k, COUNT(*) AS n FROM conflict_history \
             GROUP BY conflict_resolution ORDER BY n DESC, k",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut by_resolution = Vec::with_capacity(resolution_rows.len());
        for row in &resolution_rows {
            let key: String = row.get("k");
            let r = key
                .parse::<ConflictResolution>()
                .map_err(|e| CacheError::SerializationError(e.to_string()))?;
            by_resolution.push((r, row.get::<i64, _>("n")));
        }

        Ok(HistoryStats {
            total,
            by_type,
            by_resolution,
        })
    }
}

#[async_trait::async_trait]
impl IConflictHistory for SqliteConflictHistory {
    async fn append(&self, record: &ConflictRecord) -> anyhow::Result<i64> {
        Ok(SqliteConflictHistory::append(self, record).await?)
    }
}

// ============================================================================
// HistoryTransaction
// ============================================================================

/// A conflict-history handle bound to one open transaction
///
/// Dropping it without [`commit`](Self::commit) rolls the transaction back.
pub struct HistoryTransaction {
    tx: Mutex<Transaction<'static, Sqlite>>,
}

impl HistoryTransaction {
    /// Run a statement that belongs to the same apply step
    pub async fn execute(&self, sql: &str) -> Result<u64, CacheError> {
        let mut tx = self.tx.lock().await;
        let result = sqlx::query(sql).execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }

    pub async fn append(&self, record: &ConflictRecord) -> Result<i64, CacheError> {
        let mut tx = self.tx.lock().await;
        insert_record(&mut **tx, record).await
    }

    pub async fn commit(self) -> Result<(), CacheError> {
        self.tx.into_inner().commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), CacheError> {
        self.tx.into_inner().rollback().await?;
        tracing::debug!("Conflict history transaction rolled back");
        Ok(())
    }
}

#[async_trait::async_trait]
impl IConflictHistory for HistoryTransaction {
    async fn append(&self, record: &ConflictRecord) -> anyhow::Result<i64> {
        Ok(HistoryTransaction::append(self, record).await?)
    }
}
