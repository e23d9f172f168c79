use super::{TransactionMgr, TransactionObject, TxId};
use crate::error::MetadataResult;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct Versioned<T> {
    current: T,
    /// Value before the first uncommitted change, and the transaction that made it.
    backup: Option<(TxId, T)>,
}

/// Shared state behind [`TxCell`] and [`TxMap`].
struct TxState<T> {
    inner: Mutex<Versioned<T>>,
}

impl<T: Clone + Send + 'static> TxState<T> {
    fn new(value: T) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Versioned {
                current: value,
                backup: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Versioned<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register with `tx`, take a backup on first touch, then apply `f`.
    fn mutate<R>(
        self: &Arc<Self>,
        tx: &mut TransactionMgr,
        f: impl FnOnce(&mut T) -> R,
    ) -> MetadataResult<R> {
        tx.register(Arc::clone(self) as Arc<dyn TransactionObject>)?;
        let mut state = self.lock();
        if state.backup.is_none() {
            state.backup = Some((tx.id(), state.current.clone()));
        }
        Ok(f(&mut state.current))
    }
}

impl<T: Clone + Send + 'static> TransactionObject for TxState<T> {
    fn is_dirty(&self) -> bool {
        self.lock().backup.is_some()
    }

    fn dirty_owner(&self) -> Option<TxId> {
        self.lock().backup.as_ref().map(|(owner, _)| *owner)
    }

    fn commit(&self) {
        self.lock().backup = None;
    }

    fn rollback(&self) {
        let mut state = self.lock();
        if let Some((_, previous)) = state.backup.take() {
            state.current = previous;
        }
    }
}

/// A single transactional value.
///
/// Reads always see the latest value, including uncommitted changes; callers
/// hold the matching lock while a transaction is open.
pub struct TxCell<T> {
    state: Arc<TxState<T>>,
}

impl<T> Clone for TxCell<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + Send + 'static> TxCell<T> {
    /// Wrap an already persisted value.
    pub fn new(value: T) -> Self {
        Self {
            state: TxState::new(value),
        }
    }

    pub fn get(&self) -> T {
        self.state.lock().current.clone()
    }

    /// Replace the value, returning the previous one.
    pub fn set(&self, tx: &mut TransactionMgr, value: T) -> MetadataResult<T> {
        self.state
            .mutate(tx, |current| std::mem::replace(current, value))
    }

    /// Modify the value in place, returning the new value.
    pub fn update(&self, tx: &mut TransactionMgr, f: impl FnOnce(&mut T)) -> MetadataResult<T> {
        self.state.mutate(tx, |current| {
            f(current);
            current.clone()
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.state.is_dirty()
    }
}

impl<T: Clone + Send + std::fmt::Debug + 'static> std::fmt::Debug for TxCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TxCell").field(&self.get()).finish()
    }
}

/// A transactional ordered map.
pub struct TxMap<K, V> {
    state: Arc<TxState<BTreeMap<K, V>>>,
}

impl<K, V> Clone for TxMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<K, V> Default for TxMap<K, V>
where
    K: Ord + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TxMap<K, V>
where
    K: Ord + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::from_committed(BTreeMap::new())
    }

    /// Wrap already persisted entries.
    pub fn from_committed(entries: BTreeMap<K, V>) -> Self {
        Self {
            state: TxState::new(entries),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.state.lock().current.get(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.state.lock().current.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().current.is_empty()
    }

    pub fn keys(&self) -> Vec<K> {
        self.state.lock().current.keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<V> {
        self.state.lock().current.values().cloned().collect()
    }

    /// Copy of the current entries.
    pub fn snapshot(&self) -> BTreeMap<K, V> {
        self.state.lock().current.clone()
    }

    /// Read the entries without copying them.
    pub fn with<R>(&self, f: impl FnOnce(&BTreeMap<K, V>) -> R) -> R {
        f(&self.state.lock().current)
    }

    pub fn insert(&self, tx: &mut TransactionMgr, key: K, value: V) -> MetadataResult<Option<V>> {
        self.state.mutate(tx, |map| map.insert(key, value))
    }

    pub fn remove(&self, tx: &mut TransactionMgr, key: &K) -> MetadataResult<Option<V>> {
        self.state.mutate(tx, |map| map.remove(key))
    }

    /// Remove every entry matching `pred`, returning the removed entries.
    pub fn remove_where(
        &self,
        tx: &mut TransactionMgr,
        pred: impl Fn(&K, &V) -> bool,
    ) -> MetadataResult<Vec<(K, V)>> {
        self.state.mutate(tx, |map| {
            let keys: Vec<K> = map
                .iter()
                .filter(|(k, v)| pred(k, v))
                .map(|(k, _)| k.clone())
                .collect();
            keys.into_iter()
                .filter_map(|k| map.remove(&k).map(|v| (k, v)))
                .collect()
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.state.is_dirty()
    }
}

impl<K, V> std::fmt::Debug for TxMap<K, V>
where
    K: Ord + Clone + Send + std::fmt::Debug + 'static,
    V: Clone + Send + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.with(|map| f.debug_map().entries(map.iter()).finish())
    }
}
