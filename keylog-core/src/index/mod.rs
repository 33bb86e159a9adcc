//! In-memory key-value index
//!
//! Holds the latest value of every live key. It is rebuilt at startup by
//! replaying the WAL and then kept in step with each write.

use crate::wal::SegmentEntry;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Map from key to last-known value
#[derive(Debug, Default)]
pub struct KeyValueIndex {
    data: RwLock<HashMap<String, String>>,
}

impl KeyValueIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.data.write().insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.data.read().get(key).cloned()
    }

    /// Remove a key, returning whether it was present
    pub fn delete(&self, key: &str) -> bool {
        self.data.write().remove(key).is_some()
    }

    /// Apply one log entry: tombstones remove, live entries overwrite
    pub fn apply(&self, entry: SegmentEntry) {
        if entry.is_deleted {
            self.delete(&entry.key);
        } else {
            self.set(entry.key, entry.value.unwrap_or_default());
        }
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Copy of the contents in key order
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let index = KeyValueIndex::new();
        assert!(index.is_empty());

        index.set("name", "alice");
        assert_eq!(index.get("name"), Some("alice".to_string()));
        index.set("name", "bob");
        assert_eq!(index.get("name"), Some("bob".to_string()));

        assert!(index.delete("name"));
        assert!(!index.delete("name"));
        assert_eq!(index.get("name"), None);
    }

    #[test]
    fn test_apply_entries() {
        let index = KeyValueIndex::new();
        index.apply(SegmentEntry::put("a", "1"));
        index.apply(SegmentEntry::put("b", "2"));
        index.apply(SegmentEntry::tombstone("a"));
        index.apply(SegmentEntry::tombstone("missing"));

        assert_eq!(index.len(), 1);
        let snapshot = index.snapshot();
        assert_eq!(snapshot.get("b").map(String::as_str), Some("2"));
    }
}
