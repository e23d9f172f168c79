//! Lock scopes: a set of locks plus one transaction.

use crate::error::CtrlResult;
use crate::locks::{LockGuardBuilder, LockManager, LockGuard};
use crate::metrics;
use ferrostor_metadata::{TransactionMgr, TransactionMgrFactory};
use std::sync::Arc;
use std::time::Instant;

/// Runs closures under a lock scope and a fresh transaction.
///
/// The transaction is committed when the closure succeeds and rolled back when
/// it fails or when the commit itself fails. Locks are released only after the
/// transaction has been finished, so no other scope can observe uncommitted state.
#[derive(Clone)]
pub struct ScopeRunner {
    factory: Arc<TransactionMgrFactory>,
    locks: Arc<LockManager>,
}

impl ScopeRunner {
    pub fn new(factory: Arc<TransactionMgrFactory>, locks: Arc<LockManager>) -> Self {
        Self { factory, locks }
    }

    pub fn factory(&self) -> &Arc<TransactionMgrFactory> {
        &self.factory
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub async fn run<T>(
        &self,
        name: &'static str,
        locks: LockGuardBuilder,
        f: impl FnOnce(&mut TransactionMgr, &LockGuard) -> CtrlResult<T>,
    ) -> CtrlResult<T> {
        let start = Instant::now();
        let guard = locks.build(&self.locks).await;
        let mut tx = self.factory.begin();
        tracing::debug!(scope = name, tx = %tx.id(), locks = ?guard, "scope started");

        let result = match f(&mut tx, &guard) {
            Ok(value) => match tx.commit().await {
                Ok(()) => {
                    metrics::TRANSACTIONS_COMMITTED.inc();
                    Ok(value)
                }
                Err(e) => {
                    tracing::warn!(scope = name, tx = %tx.id(), error = %e, "commit failed");
                    tx.rollback();
                    metrics::TRANSACTIONS_ROLLED_BACK.inc();
                    Err(e.into())
                }
            },
            Err(e) => {
                tracing::debug!(scope = name, tx = %tx.id(), error = %e, "scope failed");
                tx.rollback();
                metrics::TRANSACTIONS_ROLLED_BACK.inc();
                Err(e)
            }
        };
        drop(tx);
        drop(guard);

        metrics::SCOPE_DURATION
            .with_label_values(&[name])
            .observe(start.elapsed().as_secs_f64());
        result
    }
}
