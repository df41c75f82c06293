//! Server-log rendering of conflict records
//!
//! One line per conflict, naming the conflict type, the remote node, the
//! node that last wrote the local row, the resolution and the row's key:
//!
//! ```text
//! CONFLICT: remote UPDATE from node (9,1,16384): row was previously UPDATEd at node paris (5,1,16384). Resolution: last_update_wins_keep_remote; PKEY: id[int8]:42
//! ```

use std::collections::HashMap;
use std::fmt::{self, Write};

use mmrepl_core::domain::{ConflictRecord, ConflictType, NodeId};

/// Writes `name (sysid,tli,dboid)`, or just the identity when unnamed
fn write_node(out: &mut impl Write, node: NodeId, names: &HashMap<NodeId, String>) -> fmt::Result {
    match names.get(&node) {
        Some(name) => write!(out, "{name} {node}"),
        None => write!(out, "{node}"),
    }
}

/// Renders the server-log line for `record`
pub fn server_log_line(
    record: &ConflictRecord,
    names: &HashMap<NodeId, String>,
) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let remote_cmd = match record.conflict_type() {
        ConflictType::InsertInsert | ConflictType::InsertUpdate => "INSERT",
        ConflictType::UpdateUpdate => "UPDATE",
        ConflictType::UpdateDelete if record.local_tuple_null() => "UPDATE",
        ConflictType::UpdateDelete | ConflictType::DeleteDelete => "DELETE",
        ConflictType::UnhandledTxAbort => {
            out.write_str("CONFLICT: remote transaction from node ")?;
            write_node(&mut out, record.remote_node(), names)?;
            out.write_str(" aborted")?;
            if let Some(err) = record.apply_error() {
                write!(out, ": {err}")?;
            }
            if let Some(object) = record.object_display() {
                write!(out, " on {object}")?;
            }
            write!(out, ". Resolution: {}", record.resolution())?;
            return Ok(out);
        }
    };

    write!(out, "CONFLICT: remote {remote_cmd} from node ")?;
    write_node(&mut out, record.remote_node(), names)?;
    out.write_str(": ")?;

    if record.local_tuple_null() {
        out.write_str("could not find existing row")?;
    } else {
        let verb = match record.conflict_type() {
            ConflictType::InsertInsert => "INSERTed",
            _ => "UPDATEd",
        };
        write!(out, "row was previously {verb} at node ")?;
        write_node(
            &mut out,
            record.local_tuple_origin().unwrap_or_else(NodeId::unknown),
            names,
        )?;
    }

    write!(
        out,
        ". Resolution: {}; PKEY:{}",
        record.resolution(),
        record.key_text().unwrap_or("")
    )?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mmrepl_core::domain::{
        ConflictRecordParts, ConflictResolution, ErrorInfo, Lsn, TransactionId,
    };

    use super::*;

    fn parts(conflict_type: ConflictType, resolution: ConflictResolution) -> ConflictRecordParts {
        ConflictRecordParts {
            local_node: NodeId::new(5, 1, 16384),
            local_conflict_txid: TransactionId::new(900),
            local_conflict_lsn: Lsn::new(0x2000),
            local_conflict_time: Utc::now(),
            object_schema: Some("public".into()),
            object_name: Some("orders".into()),
            remote_node: NodeId::new(9, 1, 16384),
            remote_txid: TransactionId::new(77),
            remote_commit_time: Utc::now(),
            remote_commit_lsn: Lsn::new(0x1000),
            conflict_type,
            resolution,
            local_tuple: None,
            remote_tuple: None,
            local_tuple_null: false,
            local_tuple_xmin: Some(TransactionId::new(850)),
            local_tuple_origin: Some(NodeId::new(5, 1, 16384)),
            local_commit_time: Some(Utc::now()),
            key_text: Some(" id[int8]:42".into()),
            apply_error: None,
        }
    }

    #[test]
    fn test_update_update_line() {
        let record = ConflictRecord::from(parts(
            ConflictType::UpdateUpdate,
            ConflictResolution::LastUpdateWinsKeepRemote,
        ));
        let mut names = HashMap::new();
        names.insert(NodeId::new(5, 1, 16384), "paris".to_string());

        let line = server_log_line(&record, &names).unwrap();
        assert_eq!(
            line,
            "CONFLICT: remote UPDATE from node (9,1,16384): row was previously UPDATEd \
             at node paris (5,1,16384). Resolution: last_update_wins_keep_remote; PKEY: id[int8]:42"
        );
    }

    #[test]
    fn test_insert_insert_line() {
        let record = ConflictRecord::from(parts(
            ConflictType::InsertInsert,
            ConflictResolution::LastUpdateWinsKeepLocal,
        ));
        let line = server_log_line(&record, &HashMap::new()).unwrap();
        assert!(line.starts_with("CONFLICT: remote INSERT from node (9,1,16384): row was previously INSERTed"));
        assert!(line.contains("Resolution: last_update_wins_keep_local"));
    }

    #[test]
    fn test_missing_row_line() {
        let mut p = parts(ConflictType::DeleteDelete, ConflictResolution::DefaultSkipChange);
        p.local_tuple_null = true;
        p.local_tuple_origin = None;
        p.key_text = Some(" id[int8]:7".into());
        let line = server_log_line(&ConflictRecord::from(p), &HashMap::new()).unwrap();
        assert_eq!(
            line,
            "CONFLICT: remote DELETE from node (9,1,16384): could not find existing row. \
             Resolution: skip_change; PKEY: id[int8]:7"
        );
    }

    #[test]
    fn test_update_of_deleted_row_line() {
        let mut p = parts(ConflictType::UpdateDelete, ConflictResolution::DefaultSkipChange);
        p.local_tuple_null = true;
        let line = server_log_line(&ConflictRecord::from(p), &HashMap::new()).unwrap();
        assert!(line.starts_with("CONFLICT: remote UPDATE from node"));
        assert!(line.contains("could not find existing row"));
    }

    #[test]
    fn test_apply_error_line() {
        let mut p = parts(ConflictType::UnhandledTxAbort, ConflictResolution::UnhandledTxAbort);
        p.local_tuple_null = true;
        p.apply_error = Some(ErrorInfo::new("23505", "duplicate key value"));
        let line = server_log_line(&ConflictRecord::from(p), &HashMap::new()).unwrap();
        assert_eq!(
            line,
            "CONFLICT: remote transaction from node (9,1,16384) aborted: [23505] duplicate key value \
             on public.orders. Resolution: unhandled_tx_abort"
        );
    }
}
