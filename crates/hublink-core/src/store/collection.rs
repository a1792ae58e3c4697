// ── Generic keyed collection ──
//
// Concurrent storage with O(1) lookups plus a sorted snapshot that is
// swapped in whole on every effective write. Readers never see a
// half-applied change.

use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;

/// Anything stored in a collection knows its own key.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// Outcome of [`EntityCollection::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Identical to what was stored; nothing was published.
    Unchanged,
}

/// A keyed collection for a single item type.
///
/// Every effective mutation rebuilds the snapshot readers get. Writes
/// that change nothing publish nothing, so replaying the same event is
/// invisible to readers.
pub(crate) struct EntityCollection<T: Keyed + PartialEq + Send + Sync + 'static> {
    by_key: DashMap<String, Arc<T>>,
    snapshot: ArcSwap<Vec<Arc<T>>>,
}

impl<T: Keyed + PartialEq + Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        Self {
            by_key: DashMap::new(),
            snapshot: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Insert or replace by key.
    pub(crate) fn upsert(&self, item: T) -> UpsertOutcome {
        let key = item.key().to_owned();
        let outcome = match self.by_key.get(&key) {
            Some(existing) if **existing == item => return UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        };

        self.by_key.insert(key, Arc::new(item));
        self.publish();
        outcome
    }

    /// Replace the whole collection in one step: readers see either the
    /// old snapshot or the new one, never a mix.
    pub(crate) fn replace_all(&self, items: Vec<T>) {
        let mut fresh: Vec<Arc<T>> = items.into_iter().map(Arc::new).collect();
        fresh.sort_by(|a, b| a.key().cmp(b.key()));
        fresh.dedup_by(|a, b| a.key() == b.key());

        self.by_key.clear();
        for item in &fresh {
            self.by_key.insert(item.key().to_owned(), Arc::clone(item));
        }
        self.snapshot.store(Arc::new(fresh));
    }

    /// Apply `f` to a copy of the item at `key` and store the result.
    /// Returns the previous value, or `None` if the key is absent.
    pub(crate) fn update<F>(&self, key: &str, f: F) -> Option<Arc<T>>
    where
        F: FnOnce(&T) -> T,
    {
        let previous = self.get(key)?;
        let next = f(&previous);
        if next != *previous {
            self.by_key.insert(key.to_owned(), Arc::new(next));
            self.publish();
        }
        Some(previous)
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.load_full()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn publish(&self) {
        let mut values: Vec<Arc<T>> = self.by_key.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| a.key().cmp(b.key()));
        self.snapshot.store(Arc::new(values));
    }
}
