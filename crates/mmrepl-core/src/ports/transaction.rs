//! Transaction context port (driven/secondary port)
//!
//! Read-only queries into the transaction machinery surrounding the apply
//! path. The conflict core never begins, commits or aborts transactions.

use chrono::{DateTime, Utc};

use crate::domain::newtypes::{Lsn, TransactionId};

/// The enclosing apply transaction, as seen by the conflict core
pub trait ITransactionContext: Send + Sync {
    /// Whether a transaction is currently open
    fn in_transaction(&self) -> bool;

    /// Whether the open transaction has already failed and awaits rollback
    fn is_aborted(&self) -> bool;

    /// Id of the current local transaction
    fn current_txid(&self) -> TransactionId;

    /// Current write-ahead log insert position
    fn current_lsn(&self) -> Lsn;

    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;
}
