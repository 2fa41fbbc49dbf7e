//! Authoritative in-memory state shared by every connection.
//!
//! The store keeps two [`OrderedIndex`] instances:
//!
//! - **key index** (`key -> value`), guarded by lock L1
//! - **value index** (`value -> number of keys holding it`), guarded by lock L2
//!
//! Whenever both locks are needed, L1 is taken first and L2 is taken while L1
//! is held. Every method here follows that order.

use std::collections::HashMap;
use std::mem;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::{CacheError, Result};
use crate::item::{CacheItem, LogCommand, LogEntry};
use crate::ordered_index::OrderedIndex;

type KeyIndex = OrderedIndex<String, String>;
type ValueIndex = OrderedIndex<String, u64>;

/// Thread-safe dual-indexed cache.
///
/// # Consistency
///
/// Writers hold L1 for the whole mutation, so writers are serialised against
/// each other and against `get`. The value index is updated inside a single L2
/// critical section per mutation, which means `get_count` always sees a value
/// index that matches *some* committed key index state. A caller that reads
/// the key index and then the value index without holding either lock can
/// still land between the two updates; that window is accepted in exchange for
/// never blocking `get_count` behind key-index readers.
///
/// # Zero counts
///
/// Value index nodes are created on first reference and never removed, even
/// once their count drops back to zero. A long-lived store that cycles through
/// many distinct values therefore grows its value index monotonically.
#[derive(Default)]
pub struct Store {
    keys: Mutex<KeyIndex>,
    values: Mutex<ValueIndex>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the current value for `key`.
    ///
    /// Readers take L1 exclusively; there is no shared-read path.
    pub fn get(&self, key: &str) -> Result<CacheItem> {
        let keys = lock(&self.keys);
        keys.get(key)
            .map(|value| CacheItem::new(key, value.as_str()))
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    /// Stores `item`, overwriting any existing value. Returns the previous value.
    pub fn set(&self, item: CacheItem) -> Option<String> {
        let mut keys = lock(&self.keys);
        self.set_locked(&mut keys, item)
    }

    /// Deletes `key`, returning the value it held.
    pub fn unset(&self, key: &str) -> Result<String> {
        let mut keys = lock(&self.keys);
        self.unset_locked(&mut keys, key)
    }

    /// Number of keys currently holding `value`; 0 for values never seen.
    pub fn get_count(&self, value: &str) -> u64 {
        lock(&self.values).get(value).copied().unwrap_or(0)
    }

    /// Applies `entries` in order as one batch.
    ///
    /// L1 is held for the entire batch and the batch is checked before any
    /// entry is applied: if some `Unset` would hit a missing key (taking the
    /// earlier entries of the batch into account) the call fails with
    /// [`CacheError::NotFound`] and the store is left untouched.
    pub fn execute_log(&self, entries: &[LogEntry]) -> Result<()> {
        let mut keys = lock(&self.keys);
        validate_log(&keys, entries)?;

        for entry in entries {
            match entry.command {
                LogCommand::Set => {
                    self.set_locked(&mut keys, entry.item.clone());
                }
                LogCommand::Unset => {
                    self.unset_locked(&mut keys, &entry.item.key)?;
                }
            }
        }
        debug!(entries = entries.len(), "applied log batch");
        Ok(())
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        lock(&self.keys).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set_locked(&self, keys: &mut KeyIndex, item: CacheItem) -> Option<String> {
        let CacheItem { key, value } = item;
        let previous = match keys.get_mut(key.as_str()) {
            Some(slot) => Some(mem::replace(slot, value.clone())),
            None => {
                keys.insert(key, value.clone());
                None
            }
        };

        let mut values = lock(&self.values);
        if let Some(old) = &previous {
            adjust_count(&mut values, old, -1);
        }
        adjust_count(&mut values, &value, 1);
        previous
    }

    fn unset_locked(&self, keys: &mut KeyIndex, key: &str) -> Result<String> {
        let removed = keys
            .remove(key)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;
        adjust_count(&mut lock(&self.values), &removed, -1);
        Ok(removed)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Index mutations never panic midway, so a poisoned guard still holds a
    // consistent tree.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn adjust_count(values: &mut ValueIndex, value: &str, delta: i64) {
    match values.get_mut(value) {
        Some(count) => *count = count.saturating_add_signed(delta),
        None => {
            values.insert(value.to_string(), 0u64.saturating_add_signed(delta));
        }
    }
}

/// Simulates key presence across the batch so that it can be rejected as a whole.
fn validate_log(keys: &KeyIndex, entries: &[LogEntry]) -> Result<()> {
    let mut present: HashMap<&str, bool> = HashMap::new();
    for entry in entries {
        let key = entry.item.key.as_str();
        match entry.command {
            LogCommand::Set => {
                present.insert(key, true);
            }
            LogCommand::Unset => {
                let exists = present
                    .get(key)
                    .copied()
                    .unwrap_or_else(|| keys.contains_key(key));
                if !exists {
                    return Err(CacheError::NotFound(key.to_string()));
                }
                present.insert(key, false);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn set_get_unset_tracks_counts() {
        let store = Store::new();

        assert_eq!(store.set(CacheItem::new("x", "1")), None);
        assert_eq!(store.get("x").expect("x present").value, "1");
        assert_eq!(store.get_count("1"), 1);

        assert_eq!(store.set(CacheItem::new("x", "2")).as_deref(), Some("1"));
        assert_eq!(store.get_count("1"), 0);
        assert_eq!(store.get_count("2"), 1);

        assert_eq!(store.unset("x").expect("x removed"), "2");
        assert!(store.get("x").unwrap_err().is_not_found());
        assert_eq!(store.get_count("2"), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn overwrite_keeps_one_node_per_key() {
        let store = Store::new();
        store.set(CacheItem::new("k", "a"));
        assert_eq!(store.set(CacheItem::new("k", "b")).as_deref(), Some("a"));
        assert_eq!(store.set(CacheItem::new("fresh", "b")), None);

        assert_eq!(lock(&store.keys).len(), 2);
        assert_eq!(store.get("k").expect("k present").value, "b");
        assert_eq!(store.get_count("a"), 0);
        assert_eq!(store.get_count("b"), 2);
    }

    #[test]
    fn get_count_defaults_to_zero() {
        let store = Store::new();
        assert_eq!(store.get_count("never-seen"), 0);
    }

    #[test]
    fn unset_missing_key_is_not_found() {
        let store = Store::new();
        let err = store.unset("ghost").unwrap_err();
        assert!(matches!(err, CacheError::NotFound(key) if key == "ghost"));
    }

    #[test]
    fn resetting_same_value_does_not_double_count() {
        let store = Store::new();
        for _ in 0..5 {
            store.set(CacheItem::new("k", "v"));
        }
        assert_eq!(store.get_count("v"), 1);

        store.set(CacheItem::new("other", "v"));
        assert_eq!(store.get_count("v"), 2);
    }

    #[test]
    fn counts_match_keys_after_mixed_operations() {
        let store = Store::new();
        let ops: &[(&str, Option<&str>)] = &[
            ("a", Some("red")),
            ("b", Some("red")),
            ("c", Some("blue")),
            ("a", Some("blue")),
            ("b", None),
            ("d", Some("red")),
            ("c", Some("green")),
        ];
        for (key, value) in ops {
            match value {
                Some(value) => {
                    store.set(CacheItem::new(*key, *value));
                }
                None => {
                    store.unset(key).expect("key present");
                }
            }
        }

        // a=blue, c=green, d=red
        assert_eq!(store.get_count("red"), 1);
        assert_eq!(store.get_count("blue"), 1);
        assert_eq!(store.get_count("green"), 1);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn execute_log_applies_in_order() {
        let store = Store::new();
        store.set(CacheItem::new("a", "1"));

        let batch = vec![
            LogEntry::restore(CacheItem::new("b", "2")),
            LogEntry::delete("a"),
            LogEntry::restore(CacheItem::new("a", "3")),
        ];
        store.execute_log(&batch).expect("batch applies");

        assert_eq!(store.get("a").expect("a").value, "3");
        assert_eq!(store.get("b").expect("b").value, "2");
        assert_eq!(store.get_count("1"), 0);
        assert_eq!(store.get_count("3"), 1);
    }

    #[test]
    fn execute_log_rejects_whole_batch_on_missing_key() {
        let store = Store::new();
        store.set(CacheItem::new("a", "1"));

        let batch = vec![
            LogEntry::restore(CacheItem::new("a", "changed")),
            LogEntry::delete("a"),
            // `a` is gone by now within the batch.
            LogEntry::delete("a"),
        ];
        let err = store.execute_log(&batch).unwrap_err();
        assert!(err.is_not_found());

        assert_eq!(store.get("a").expect("a untouched").value, "1");
        assert_eq!(store.get_count("1"), 1);
        assert_eq!(store.get_count("changed"), 0);
    }

    #[test]
    fn zero_count_values_are_kept() {
        let store = Store::new();
        store.set(CacheItem::new("k", "v"));
        store.unset("k").expect("k present");

        let values = lock(&store.values);
        assert_eq!(values.get("v"), Some(&0));
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn concurrent_disjoint_sets_keep_counts_exact() {
        let store = Arc::new(Store::new());
        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("w{worker}-k{i}");
                        store.set(CacheItem::new(key.as_str(), "shared"));
                        store.set(CacheItem::new(key.as_str(), format!("v{}", i % 4)));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker panicked");
        }

        assert_eq!(store.len(), 8 * 200);
        assert_eq!(store.get_count("shared"), 0);
        for bucket in 0..4 {
            assert_eq!(store.get_count(&format!("v{bucket}")), 8 * 50);
        }
    }
}
