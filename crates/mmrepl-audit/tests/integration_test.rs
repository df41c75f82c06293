//! Integration test: ConflictLogger → SQLite → query back
//!
//! Uses a real in-memory SQLite database to verify the full flow:
//! ConflictLogger writes records through a history transaction →
//! the transaction commits or rolls back → SqliteConflictHistory reads
//! them back.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use mmrepl_audit::{ConflictLogger, ConflictMetrics, LogDestinations};
use mmrepl_cache::{DatabasePool, SqliteConflictHistory};
use mmrepl_core::domain::{
    ConflictRecord, ConflictRecordParts, ConflictResolution, ConflictType, Datum, Lsn, NodeId,
    TransactionId, Tuple,
};

async fn make_history() -> SqliteConflictHistory {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    SqliteConflictHistory::new(pool.pool().clone())
}

fn record(conflict_type: ConflictType, resolution: ConflictResolution) -> ConflictRecord {
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let key = Tuple::default().with_key("id", "int8", Datum::Int(1));
    ConflictRecord::from(ConflictRecordParts {
        local_node: NodeId::new(5, 1, 16384),
        local_conflict_txid: TransactionId::new(901),
        local_conflict_lsn: Lsn::new(0x2000),
        local_conflict_time: t0 + Duration::seconds(5),
        object_schema: Some("public".into()),
        object_name: Some("orders".into()),
        remote_node: NodeId::new(9, 1, 16384),
        remote_txid: TransactionId::new(77),
        remote_commit_time: t0,
        remote_commit_lsn: Lsn::new(0x1000),
        conflict_type,
        resolution,
        local_tuple: None,
        remote_tuple: None,
        local_tuple_null: false,
        local_tuple_xmin: Some(TransactionId::new(850)),
        local_tuple_origin: Some(NodeId::new(5, 1, 16384)),
        local_commit_time: Some(t0 - Duration::seconds(30)),
        key_text: Some(key.render_key()),
        apply_error: None,
    })
}

#[tokio::test]
async fn test_conflict_logger_integration_with_sqlite() {
    let history = make_history().await;
    let metrics = Arc::new(ConflictMetrics::new().unwrap());
    let logger = ConflictLogger::new(LogDestinations::all()).with_metrics(Arc::clone(&metrics));

    let tx = history.begin().await.unwrap();
    let first = logger
        .log(
            &record(ConflictType::InsertInsert, ConflictResolution::LastUpdateWinsKeepRemote),
            &tx,
        )
        .await
        .unwrap();
    let second = logger
        .log(
            &record(ConflictType::DeleteDelete, ConflictResolution::DefaultSkipChange),
            &tx,
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert!(first.is_some() && second.is_some());
    assert_eq!(history.count().await.unwrap(), 2);

    let recent = history.recent(10).await.unwrap();
    assert_eq!(recent[0].id, second.unwrap());
    assert_eq!(recent[0].record.conflict_type(), ConflictType::DeleteDelete);
    assert_eq!(recent[1].record.resolution(), ConflictResolution::LastUpdateWinsKeepRemote);
    assert_eq!(recent[1].record.key_text(), Some(" id[int8]:1"));

    assert_eq!(
        metrics.conflicts(ConflictType::DeleteDelete, ConflictResolution::DefaultSkipChange),
        1
    );
}

#[tokio::test]
async fn test_rolled_back_apply_leaves_no_history_row() {
    let history = make_history().await;
    let logger = ConflictLogger::new(LogDestinations::all());

    let tx = history.begin().await.unwrap();
    let id = logger
        .log(
            &record(ConflictType::UpdateUpdate, ConflictResolution::LastUpdateWinsKeepLocal),
            &tx,
        )
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert!(id.is_some());
    assert_eq!(history.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_server_log_only_writes_no_rows() {
    let history = make_history().await;
    let logger = ConflictLogger::new(LogDestinations {
        table: false,
        server_log: true,
    })
    .with_node_name(NodeId::new(9, 1, 16384), "berlin");

    let id = logger
        .log(
            &record(ConflictType::UpdateDelete, ConflictResolution::DefaultSkipChange),
            &history,
        )
        .await
        .unwrap();

    assert!(id.is_none());
    assert_eq!(history.count().await.unwrap(), 0);
}
