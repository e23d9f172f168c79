//! Named read/write locks over the controller's object maps.
//!
//! Every lock scope is declared up front with a [`LockGuardBuilder`] and then
//! acquired in one go. Locks are always taken in [`LockObj`] order, which is the
//! cluster-wide acquisition order, so two scopes can never deadlock each other.

use crate::error::{CtrlError, CtrlResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Lockable object maps, in acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockObj {
    NodesMap,
    RscDfnMap,
    StorPoolDfnMap,
    CtrlConfig,
}

impl LockObj {
    pub const ALL: [LockObj; 4] = [
        LockObj::NodesMap,
        LockObj::RscDfnMap,
        LockObj::StorPoolDfnMap,
        LockObj::CtrlConfig,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

/// Owner of every named lock.
pub struct LockManager {
    locks: BTreeMap<LockObj, Arc<RwLock<()>>>,
    acquisitions: AtomicU64,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            locks: LockObj::ALL
                .into_iter()
                .map(|obj| (obj, Arc::new(RwLock::new(()))))
                .collect(),
            acquisitions: AtomicU64::new(0),
        }
    }

    /// Number of lock scopes built so far.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    fn lock(&self, obj: LockObj) -> Arc<RwLock<()>> {
        // Every LockObj gets a lock in `new`.
        Arc::clone(&self.locks[&obj])
    }
}

/// Deferred description of a lock scope.
#[derive(Debug, Clone, Default)]
pub struct LockGuardBuilder {
    requested: BTreeMap<LockObj, LockMode>,
}

impl LockGuardBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a shared lock. Ignored if a write lock on `obj` is already requested.
    pub fn read(mut self, obj: LockObj) -> Self {
        self.requested.entry(obj).or_insert(LockMode::Read);
        self
    }

    /// Request an exclusive lock.
    pub fn write(mut self, obj: LockObj) -> Self {
        self.requested.insert(obj, LockMode::Write);
        self
    }

    /// Acquire every requested lock in acquisition order.
    pub async fn build(self, manager: &LockManager) -> LockGuard {
        manager.acquisitions.fetch_add(1, Ordering::Relaxed);
        let mut held = Vec::with_capacity(self.requested.len());
        for (obj, mode) in self.requested {
            let lock = manager.lock(obj);
            let guard = match mode {
                LockMode::Read => HeldLock::Read(lock.read_owned().await),
                LockMode::Write => HeldLock::Write(lock.write_owned().await),
            };
            held.push((obj, guard));
        }
        LockGuard { held }
    }
}

enum HeldLock {
    Read(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Write(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

/// Locks held for one scope. Dropping the guard releases them.
pub struct LockGuard {
    held: Vec<(LockObj, HeldLock)>,
}

impl LockGuard {
    pub fn mode(&self, obj: LockObj) -> Option<LockMode> {
        self.held.iter().find(|(o, _)| *o == obj).map(|(_, l)| match l {
            HeldLock::Read(_) => LockMode::Read,
            HeldLock::Write(_) => LockMode::Write,
        })
    }

    /// Fail unless `obj` is held at least for reading.
    pub fn ensure_read(&self, obj: LockObj) -> CtrlResult<()> {
        match self.mode(obj) {
            Some(_) => Ok(()),
            None => Err(CtrlError::implementation(format!("{obj:?} is not locked"))),
        }
    }

    /// Fail unless `obj` is held for writing.
    pub fn ensure_write(&self, obj: LockObj) -> CtrlResult<()> {
        match self.mode(obj) {
            Some(LockMode::Write) => Ok(()),
            Some(LockMode::Read) => Err(CtrlError::implementation(format!(
                "{obj:?} is only read-locked but is being modified"
            ))),
            None => Err(CtrlError::implementation(format!(
                "{obj:?} is not locked but is being modified"
            ))),
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.held.iter().map(|(obj, _)| (obj, self.mode(*obj))))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_write_supersedes_read() {
        let manager = LockManager::new();
        let guard = LockGuardBuilder::new()
            .write(LockObj::RscDfnMap)
            .read(LockObj::RscDfnMap)
            .read(LockObj::NodesMap)
            .build(&manager)
            .await;
        assert_eq!(guard.mode(LockObj::RscDfnMap), Some(LockMode::Write));
        assert_eq!(guard.mode(LockObj::NodesMap), Some(LockMode::Read));
        assert!(guard.ensure_write(LockObj::RscDfnMap).is_ok());
        assert!(guard.ensure_write(LockObj::NodesMap).is_err());
        assert!(guard.ensure_read(LockObj::CtrlConfig).is_err());
        assert_eq!(manager.acquisitions(), 1);
    }

    #[tokio::test]
    async fn test_readers_share_writers_exclude() {
        let manager = Arc::new(LockManager::new());
        let r1 = LockGuardBuilder::new()
            .read(LockObj::NodesMap)
            .build(&manager)
            .await;
        let r2 = LockGuardBuilder::new()
            .read(LockObj::NodesMap)
            .build(&manager)
            .await;

        let m = Arc::clone(&manager);
        let writer = tokio::spawn(async move {
            LockGuardBuilder::new()
                .write(LockObj::NodesMap)
                .build(&m)
                .await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!writer.is_finished());

        drop(r1);
        drop(r2);
        tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .unwrap()
            .unwrap();
    }
}
