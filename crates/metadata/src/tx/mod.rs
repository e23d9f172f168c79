//! Transactions over in-memory objects and their persisted rows.
//!
//! A [`TransactionMgr`] is passed explicitly to every mutating call. Mutated
//! objects register with it; on commit the backend applies the collected
//! [`ChangeSet`](crate::ChangeSet) and only then are the in-memory changes made
//! permanent. On rollback the in-memory state is restored from the backups the
//! objects took when they were first touched.

mod containers;
mod mgr;

pub use containers::{TxCell, TxMap};
pub use mgr::{TransactionMgr, TransactionMgrFactory};

use std::fmt;

/// Identity of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxId(pub u64);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// An object whose uncommitted changes are owned by a transaction.
pub trait TransactionObject: Send + Sync {
    /// Whether the object holds changes not yet committed.
    fn is_dirty(&self) -> bool;

    /// The transaction that owns the uncommitted changes, if any.
    fn dirty_owner(&self) -> Option<TxId>;

    /// Make the uncommitted changes permanent.
    fn commit(&self);

    /// Discard the uncommitted changes.
    fn rollback(&self);
}
