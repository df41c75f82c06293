//! Integration tests for SqliteConflictHistory
//!
//! These tests exercise the conflict-history store against an in-memory
//! SQLite database. Each test function creates a fresh database to ensure
//! test isolation.

use chrono::{Duration, TimeZone, Utc};

use mmrepl_cache::{DatabasePool, SqliteConflictHistory};
use mmrepl_core::domain::{
    ConflictRecord, ConflictRecordParts, ConflictResolution, ConflictType, Datum, ErrorInfo, Lsn,
    NodeId, RelationName, TransactionId, Tuple,
};
use mmrepl_core::ports::IConflictHistory;

// ============================================================================
// Test helpers
// ============================================================================

/// Create a fresh in-memory history store for each test
async fn setup() -> SqliteConflictHistory {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    SqliteConflictHistory::new(pool.pool().clone())
}

fn order(id: i64, note: &str) -> Tuple {
    Tuple::default()
        .with_key("id", "int8", Datum::Int(id))
        .with_column("note", "text", Datum::Text(note.to_string()))
}

fn parts(conflict_type: ConflictType, resolution: ConflictResolution) -> ConflictRecordParts {
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    ConflictRecordParts {
        local_node: NodeId::new(u64::MAX - 1, 1, 16384),
        local_conflict_txid: TransactionId::new(901),
        local_conflict_lsn: Lsn::new(0x16_B374_D848),
        local_conflict_time: t0 + Duration::seconds(5),
        object_schema: Some("public".into()),
        object_name: Some("orders".into()),
        remote_node: NodeId::new(9, 1, 16384),
        remote_txid: TransactionId::new(77),
        remote_commit_time: t0 + Duration::seconds(2),
        remote_commit_lsn: Lsn::new(0x0100_0000),
        conflict_type,
        resolution,
        local_tuple: Some(order(1, "local")),
        remote_tuple: Some(order(1, "remote")),
        local_tuple_null: false,
        local_tuple_xmin: Some(TransactionId::new(850)),
        local_tuple_origin: Some(NodeId::new(5, 1, 16384)),
        local_commit_time: Some(t0),
        key_text: Some(" id[int8]:1".into()),
        apply_error: None,
    }
}

fn record(conflict_type: ConflictType, resolution: ConflictResolution) -> ConflictRecord {
    ConflictRecord::from(parts(conflict_type, resolution))
}

// ============================================================================
// Append and read back
// ============================================================================

#[tokio::test]
async fn test_append_and_get_round_trips_all_fields() {
    let history = setup().await;
    let original = record(
        ConflictType::UpdateUpdate,
        ConflictResolution::LastUpdateWinsKeepRemote,
    );

    let id = history.append(&original).await.unwrap();
    let stored = history.get(id).await.unwrap().expect("row exists");

    assert_eq!(stored.id, id);
    assert_eq!(stored.record, original);
}

#[tokio::test]
async fn test_get_missing_returns_none() {
    let history = setup().await;
    assert!(history.get(42).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_origin_stored_as_null() {
    let history = setup().await;
    let mut p = parts(ConflictType::InsertInsert, ConflictResolution::LastUpdateWinsKeepLocal);
    p.local_tuple_origin = Some(NodeId::unknown());

    let id = history.append(&ConflictRecord::from(p)).await.unwrap();
    let stored = history.get(id).await.unwrap().unwrap();

    assert!(stored.record.local_tuple_origin().is_none());
}

#[tokio::test]
async fn test_missing_local_row_and_redacted_tuples() {
    let history = setup().await;
    let mut p = parts(ConflictType::DeleteDelete, ConflictResolution::DefaultSkipChange);
    p.local_tuple = None;
    p.remote_tuple = None;
    p.local_tuple_null = true;
    p.local_tuple_xmin = None;
    p.local_tuple_origin = None;
    p.local_commit_time = None;

    let id = history.append(&ConflictRecord::from(p)).await.unwrap();
    let stored = history.get(id).await.unwrap().unwrap().record;

    assert!(stored.local_tuple_null());
    assert!(stored.local_tuple().is_none());
    assert!(stored.remote_tuple().is_none());
    assert!(stored.local_commit_time().is_none());
    assert_eq!(stored.key_text(), Some(" id[int8]:1"));
}

#[tokio::test]
async fn test_apply_error_fields_persisted() {
    let history = setup().await;
    let rel: RelationName = "sales.invoices".parse().unwrap();
    let mut err = ErrorInfo::new("23505", "duplicate key value violates unique constraint")
        .with_relation(&rel)
        .with_detail("Key (id)=(1) already exists.")
        .with_constraint("invoices_pkey");
    err.line = Some(434);
    err.function = Some("_bt_check_unique".into());
    err.cursor_pos = Some(12);

    let mut p = parts(ConflictType::UnhandledTxAbort, ConflictResolution::UnhandledTxAbort);
    p.object_schema = Some("sales".into());
    p.object_name = Some("invoices".into());
    p.apply_error = Some(err.clone());

    let id = history.append(&ConflictRecord::from(p)).await.unwrap();
    let stored = history.get(id).await.unwrap().unwrap().record;

    assert_eq!(stored.apply_error(), Some(&err));
    assert_eq!(stored.object_display().as_deref(), Some("sales.invoices"));
}

#[tokio::test]
async fn test_apply_error_without_table_keeps_its_own_attribution() {
    let history = setup().await;
    let err = ErrorInfo::new("40P01", "deadlock detected");

    let mut p = parts(ConflictType::UnhandledTxAbort, ConflictResolution::UnhandledTxAbort);
    p.apply_error = Some(err.clone());

    let id = history.append(&ConflictRecord::from(p)).await.unwrap();
    let stored = history.get(id).await.unwrap().unwrap().record;

    assert_eq!(stored.apply_error(), Some(&err));
    assert!(stored.apply_error().unwrap().table.is_none());
    assert_eq!(stored.object_display().as_deref(), Some("public.orders"));
}

#[tokio::test]
async fn test_invalid_remote_txid_stored_as_null() {
    let db = DatabasePool::in_memory().await.unwrap();
    let history = SqliteConflictHistory::new(db.pool().clone());
    let mut p = parts(ConflictType::UnhandledTxAbort, ConflictResolution::UnhandledTxAbort);
    p.remote_txid = TransactionId::INVALID;

    let id = history.append(&ConflictRecord::from(p)).await.unwrap();

    let (stored_txid,): (Option<i64>,) =
        sqlx::query_as("SELECT remote_txid FROM conflict_history WHERE id = ?")
            .bind(id)
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(stored_txid, None);

    let stored = history.get(id).await.unwrap().unwrap().record;
    assert_eq!(stored.remote_txid(), TransactionId::INVALID);
}

#[tokio::test]
async fn test_non_finite_float_columns_list_back() {
    let history = setup().await;
    let scored = |v: f64| order(1, "local").with_column("score", "float8", Datum::Float(v));
    let mut p = parts(ConflictType::UpdateUpdate, ConflictResolution::LastUpdateWinsKeepRemote);
    p.local_tuple = Some(scored(f64::NAN));
    p.remote_tuple = Some(scored(f64::NEG_INFINITY));
    let original = ConflictRecord::from(p);

    history.append(&original).await.unwrap();
    let listed = history.recent(10).await.unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].record, original);
    assert!(matches!(
        listed[0].record.local_tuple().unwrap().get("score"),
        Some(Datum::Float(v)) if v.is_nan()
    ));
}

#[tokio::test]
async fn test_recent_orders_newest_first_and_limits() {
    let history = setup().await;
    let first = history
        .append(&record(ConflictType::InsertInsert, ConflictResolution::LastUpdateWinsKeepLocal))
        .await
        .unwrap();
    let second = history
        .append(&record(ConflictType::UpdateDelete, ConflictResolution::DefaultSkipChange))
        .await
        .unwrap();
    let third = history
        .append(&record(ConflictType::DeleteDelete, ConflictResolution::DefaultSkipChange))
        .await
        .unwrap();

    let recent = history.recent(2).await.unwrap();
    let ids: Vec<i64> = recent.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![third, second]);
    assert!(first < second);
    assert_eq!(history.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_stats_groups_by_type_and_resolution() {
    let history = setup().await;
    for _ in 0..3 {
        history
            .append(&record(
                ConflictType::UpdateUpdate,
                ConflictResolution::LastUpdateWinsKeepRemote,
            ))
            .await
            .unwrap();
    }
    history
        .append(&record(ConflictType::DeleteDelete, ConflictResolution::DefaultSkipChange))
        .await
        .unwrap();

    let stats = history.stats().await.unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(
        stats.by_type,
        vec![(ConflictType::UpdateUpdate, 3), (ConflictType::DeleteDelete, 1)]
    );
    assert_eq!(
        stats.by_resolution,
        vec![
            (ConflictResolution::LastUpdateWinsKeepRemote, 3),
            (ConflictResolution::DefaultSkipChange, 1)
        ]
    );
}

#[tokio::test]
async fn test_port_append_through_trait_object() {
    let history = setup().await;
    let port: &dyn IConflictHistory = &history;
    let id = port
        .append(&record(ConflictType::InsertInsert, ConflictResolution::LastUpdateWinsKeepRemote))
        .await
        .unwrap();
    assert_eq!(history.count().await.unwrap(), 1);
    assert!(history.get(id).await.unwrap().is_some());
}

// ============================================================================
// Transactions
// ============================================================================

#[tokio::test]
async fn test_transaction_commit_makes_rows_visible() {
    let history = setup().await;
    let tx = history.begin().await.unwrap();
    tx.append(&record(ConflictType::InsertInsert, ConflictResolution::LastUpdateWinsKeepRemote))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(history.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_transaction_rollback_discards_rows() {
    let history = setup().await;
    let tx = history.begin().await.unwrap();
    tx.append(&record(ConflictType::InsertInsert, ConflictResolution::LastUpdateWinsKeepRemote))
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(history.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_history_insert_aborts_whole_apply_step() {
    let history = setup().await;

    // Stand-in for the replicated table the apply step writes to.
    let setup_tx = history.begin().await.unwrap();
    setup_tx
        .execute("CREATE TABLE orders (id INTEGER PRIMARY KEY, note TEXT)")
        .await
        .unwrap();
    setup_tx
        .execute(
            "CREATE TRIGGER reject_history BEFORE INSERT ON conflict_history \
             BEGIN SELECT RAISE(ABORT, 'constraint violation'); END",
        )
        .await
        .unwrap();
    setup_tx.commit().await.unwrap();

    let tx = history.begin().await.unwrap();
    tx.execute("INSERT INTO orders (id, note) VALUES (1, 'remote')")
        .await
        .unwrap();
    let err = tx
        .append(&record(ConflictType::InsertInsert, ConflictResolution::LastUpdateWinsKeepRemote))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("constraint violation"));
    tx.rollback().await.unwrap();

    assert_eq!(history.count().await.unwrap(), 0);
    let check = history.begin().await.unwrap();
    let remaining = check.execute("DELETE FROM orders").await.unwrap();
    check.rollback().await.unwrap();
    assert_eq!(remaining, 0, "apply write must be rolled back too");
}

#[tokio::test]
async fn test_file_backed_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.db");

    {
        let pool = DatabasePool::new(&path).await.unwrap();
        let history = SqliteConflictHistory::new(pool.pool().clone());
        history
            .append(&record(ConflictType::UpdateUpdate, ConflictResolution::LastUpdateWinsKeepLocal))
            .await
            .unwrap();
        pool.pool().close().await;
    }

    let pool = DatabasePool::open_read_only(&path).await.unwrap();
    let history = SqliteConflictHistory::new(pool.pool().clone());
    assert_eq!(history.count().await.unwrap(), 1);
}
