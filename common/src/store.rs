//! Collaborator interfaces for reading and writing records, plus an
//! in-memory ordered store that implements all of them.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use anyhow::anyhow;
use bytes::Bytes;

use crate::shard::{ShardRange, Upper};
use crate::{KeyValue, Reducer, ReduceOutput};

/// A lazily evaluated batch of records.
pub type Records<'a> = Box<dyn Iterator<Item = anyhow::Result<KeyValue>> + 'a>;

/// Ordered, range-scannable input.
///
/// `get` yields at most `max_entries` records with keys in `(start, end]`,
/// in ascending key order. Keys may repeat (intermediate data), in which case
/// values of one key come out in the order they were written. Implementations
/// must tolerate concurrent readers.
pub trait Source: Send + Sync {
    fn get(&self, range: &ShardRange, max_entries: usize) -> anyhow::Result<Records<'_>>;
}

/// Record output. Implementations must tolerate concurrent writers.
pub trait Sink: Send + Sync {
    fn put(&self, kv: KeyValue) -> anyhow::Result<()>;
}

/// Stores that can drop every record of a key.
pub trait Purge: Send + Sync {
    /// Removes all values of `key`, returning how many were removed.
    fn purge(&self, key: &[u8]) -> anyhow::Result<usize>;
}

impl<T: Source + ?Sized> Source for Arc<T> {
    fn get(&self, range: &ShardRange, max_entries: usize) -> anyhow::Result<Records<'_>> {
        (**self).get(range, max_entries)
    }
}

impl<T: Sink + ?Sized> Sink for Arc<T> {
    fn put(&self, kv: KeyValue) -> anyhow::Result<()> {
        (**self).put(kv)
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSink;

impl Sink for NoOpSink {
    fn put(&self, _kv: KeyValue) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Thread-safe ordered multimap held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Bytes, Vec<Bytes>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kv: KeyValue) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        entries.entry(kv.key).or_default().push(kv.value);
        Ok(())
    }

    /// Total number of values across all keys.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .map(|entries| entries.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every record, ordered by key.
    pub fn snapshot(&self) -> anyhow::Result<Vec<KeyValue>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(entries
            .iter()
            .flat_map(|(key, values)| {
                values
                    .iter()
                    .map(move |value| KeyValue::new(key.clone(), value.clone()))
            })
            .collect())
    }
}

impl FromIterator<KeyValue> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = KeyValue>>(iter: I) -> Self {
        let mut entries: BTreeMap<Bytes, Vec<Bytes>> = BTreeMap::new();
        for kv in iter {
            entries.entry(kv.key).or_default().push(kv.value);
        }
        Self {
            entries: RwLock::new(entries),
        }
    }
}

impl Source for MemoryStore {
    fn get(&self, range: &ShardRange, max_entries: usize) -> anyhow::Result<Records<'_>> {
        if let Upper::Inclusive(end) = &range.end {
            if range.start >= *end {
                return Ok(Box::new(std::iter::empty()));
            }
        }

        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        let upper = match &range.end {
            Upper::Inclusive(end) => Bound::Included(end.as_ref()),
            Upper::Unbounded => Bound::Unbounded,
        };

        // Copy the batch out so the lock is not held while the caller writes
        // back into this store.
        let batch: Vec<KeyValue> = entries
            .range::<[u8], _>((Bound::Excluded(range.start.as_ref()), upper))
            .flat_map(|(key, values)| {
                values
                    .iter()
                    .map(move |value| KeyValue::new(key.clone(), value.clone()))
            })
            .take(max_entries)
            .collect();

        Ok(Box::new(batch.into_iter().map(Ok)))
    }
}

impl Sink for MemoryStore {
    fn put(&self, kv: KeyValue) -> anyhow::Result<()> {
        self.insert(kv)
    }
}

impl Purge for MemoryStore {
    fn purge(&self, key: &[u8]) -> anyhow::Result<usize> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(entries.remove(key).map(|values| values.len()).unwrap_or(0))
    }
}

/// Reducer that deletes each key it is handed from a store and emits nothing.
///
/// Run by the cleanup task over intermediate data.
pub struct PurgeReducer<P: ?Sized> {
    store: Arc<P>,
}

impl<P: Purge + ?Sized> PurgeReducer<P> {
    pub fn new(store: Arc<P>) -> Self {
        Self { store }
    }
}

impl<P: Purge + ?Sized> Reducer for PurgeReducer<P> {
    fn reduce(&self, key: Bytes, _values: Vec<Bytes>) -> ReduceOutput {
        self.store.purge(&key)?;
        Ok(Box::new(std::iter::empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(names: &[&'static str]) -> MemoryStore {
        names.iter().map(|k| KeyValue::new(*k, *k)).collect()
    }

    fn keys(source: &dyn Source, range: &ShardRange, max: usize) -> Vec<String> {
        source
            .get(range, max)
            .unwrap()
            .map(|kv| String::from_utf8(kv.unwrap().key.to_vec()).unwrap())
            .collect()
    }

    fn range(start: &'static str, end: &'static str) -> ShardRange {
        ShardRange::new(start, Upper::Inclusive(Bytes::from(end)))
    }

    #[test]
    fn start_is_exclusive_and_end_inclusive() {
        let store = store(&["a", "b", "c", "d"]);
        assert_eq!(keys(&store, &range("a", "c"), 10), vec!["b", "c"]);
        assert_eq!(
            keys(&store, &ShardRange::new("", Upper::Unbounded), 10),
            vec!["a", "b", "c", "d"]
        );
    }

    #[test]
    fn degenerate_range_is_empty() {
        let store = store(&["a", "b"]);
        assert!(keys(&store, &range("b", "b"), 10).is_empty());
        assert!(keys(&store, &range("b", "a"), 10).is_empty());
    }

    #[test]
    fn honours_max_entries() {
        let store = store(&["a", "b", "c", "d"]);
        assert_eq!(keys(&store, &range("", "z"), 3), vec!["a", "b", "c"]);
        assert!(keys(&store, &range("", "z"), 0).is_empty());
    }

    #[test]
    fn repeated_keys_keep_write_order() {
        let store = MemoryStore::new();
        store.put(KeyValue::new("b", "2")).unwrap();
        store.put(KeyValue::new("a", "1")).unwrap();
        store.put(KeyValue::new("a", "3")).unwrap();

        let values: Vec<_> = store
            .get(&ShardRange::new("", Upper::Unbounded), 10)
            .unwrap()
            .map(|kv| kv.unwrap().to_string())
            .collect();
        assert_eq!(values, vec!["a 1", "a 3", "b 2"]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn purge_reducer_drops_the_key() {
        let store = Arc::new(store(&["a", "b"]));
        let reducer = PurgeReducer::new(store.clone());
        let out: Vec<_> = reducer
            .reduce(Bytes::from("a"), vec![Bytes::from("a")])
            .unwrap()
            .collect();
        assert!(out.is_empty());
        assert_eq!(keys(&*store, &ShardRange::new("", Upper::Unbounded), 10), vec!["b"]);
    }
}
