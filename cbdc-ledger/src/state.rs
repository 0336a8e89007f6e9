//! Versioned world state and optimistic commit
//!
//! Every committed key carries the [`Version`] of the commit that last wrote
//! it. A [`ReadWriteSet`] commits only if every key it read still has the
//! version observed during simulation; otherwise the whole set is rejected
//! and nothing is written.

use crate::{stub::Selector, Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Commit sequence number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(pub u64);

impl Version {
    /// Version following this one
    pub fn next(self) -> Self {
        Version(self.0 + 1)
    }
}

/// Value together with the version that wrote it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedValue {
    /// Commit that wrote the value
    pub version: Version,
    /// Raw document bytes
    pub value: Vec<u8>,
}

/// Outcome of simulating one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadWriteSet {
    /// Transaction id of the invocation
    pub tx_id: String,
    /// Key -> version observed (`None` = absent)
    pub reads: BTreeMap<String, Option<Version>>,
    /// Key -> value to write
    pub writes: BTreeMap<String, Vec<u8>>,
}

impl ReadWriteSet {
    /// Empty set for a transaction
    pub fn new(tx_id: impl Into<String>) -> Self {
        Self {
            tx_id: tx_id.into(),
            ..Default::default()
        }
    }

    /// True when nothing would be written
    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }

    /// MVCC check against the current version of each read key
    pub fn validate_reads<F>(&self, mut current_version: F) -> Result<()>
    where
        F: FnMut(&str) -> Result<Option<Version>>,
    {
        for (key, observed) in &self.reads {
            if current_version(key)? != *observed {
                return Err(Error::ReadConflict { key: key.clone() });
            }
        }
        Ok(())
    }
}

/// Shared key-value store with versioned, atomic commits
pub trait WorldState: Send + Sync {
    /// Current value and version of a key
    fn get(&self, key: &str) -> Result<Option<VersionedValue>>;

    /// Documents matching a selector
    fn query(&self, selector: &Selector) -> Result<Vec<(String, Vec<u8>)>>;

    /// Validate the read-set and apply the write-set as one unit
    fn commit(&self, rwset: &ReadWriteSet) -> Result<Version>;

    /// Version of the latest commit
    fn height(&self) -> Version;
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: BTreeMap<String, VersionedValue>,
    height: Version,
}

/// In-process world state
#[derive(Debug, Default)]
pub struct MemoryWorldState {
    inner: RwLock<MemoryInner>,
}

impl MemoryWorldState {
    /// Empty world state
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every committed key and value
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.inner
            .read()
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect()
    }
}

impl WorldState for MemoryWorldState {
    fn get(&self, key: &str) -> Result<Option<VersionedValue>> {
        Ok(self.inner.read().entries.get(key).cloned())
    }

    fn query(&self, selector: &Selector) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .inner
            .read()
            .entries
            .iter()
            .filter(|(_, v)| selector.matches_bytes(&v.value))
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect())
    }

    fn commit(&self, rwset: &ReadWriteSet) -> Result<Version> {
        let mut inner = self.inner.write();

        rwset.validate_reads(|key| Ok(inner.entries.get(key).map(|v| v.version)))?;

        let version = inner.height.next();
        for (key, value) in &rwset.writes {
            inner.entries.insert(
                key.clone(),
                VersionedValue {
                    version,
                    value: value.clone(),
                },
            );
        }
        inner.height = version;

        tracing::debug!(
            tx_id = %rwset.tx_id,
            version = version.0,
            writes = rwset.writes.len(),
            "Read/write set committed"
        );

        Ok(version)
    }

    fn height(&self) -> Version {
        self.inner.read().height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_set(tx_id: &str, key: &str, value: &[u8]) -> ReadWriteSet {
        let mut rwset = ReadWriteSet::new(tx_id);
        rwset.writes.insert(key.to_string(), value.to_vec());
        rwset
    }

    #[test]
    fn test_commit_assigns_versions() {
        let world = MemoryWorldState::new();
        assert_eq!(world.height(), Version(0));

        let v1 = world.commit(&write_set("t1", "a", b"1")).unwrap();
        let v2 = world.commit(&write_set("t2", "b", b"2")).unwrap();
        assert_eq!(v1, Version(1));
        assert_eq!(v2, Version(2));
        assert_eq!(world.get("a").unwrap().unwrap().version, Version(1));
        assert_eq!(world.height(), Version(2));
    }

    #[test]
    fn test_stale_read_is_rejected() {
        let world = MemoryWorldState::new();
        world.commit(&write_set("t1", "a", b"1")).unwrap();

        let mut stale = write_set("t2", "a", b"2");
        stale.reads.insert("a".to_string(), None);

        let err = world.commit(&stale).unwrap_err();
        assert!(matches!(err, Error::ReadConflict { ref key } if key == "a"));
        assert_eq!(world.get("a").unwrap().unwrap().value, b"1".to_vec());
        assert_eq!(world.height(), Version(1));
    }

    #[test]
    fn test_conflict_applies_no_writes() {
        let world = MemoryWorldState::new();
        world.commit(&write_set("t1", "a", b"1")).unwrap();

        let mut rwset = write_set("t2", "b", b"2");
        rwset.writes.insert("c".to_string(), b"3".to_vec());
        rwset.reads.insert("a".to_string(), Some(Version(7)));

        assert!(world.commit(&rwset).is_err());
        assert!(world.get("b").unwrap().is_none());
        assert!(world.get("c").unwrap().is_none());
    }
}
