//! The state-store interface seen by one invocation
//!
//! [`ChaincodeStub`] is everything the contract is allowed to touch: the
//! platform-assigned transaction id and timestamp, keyed reads and writes, and
//! predicate queries over JSON documents. [`Simulation`] implements it on top
//! of a [`WorldState`] without mutating it: reads are recorded with the version
//! observed, writes are buffered, and the resulting [`ReadWriteSet`] is handed
//! to the committer.

use crate::{
    state::{ReadWriteSet, WorldState},
    types::DocType,
    Error, Result,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// Predicate over stored JSON documents
///
/// Matches documents whose `docType` equals the given tag and, when any
/// alternatives are present, where at least one `field == value` holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    doc_type: DocType,
    any_of: Vec<(String, String)>,
}

impl Selector {
    /// All documents of one type
    pub fn doc_type(doc_type: DocType) -> Self {
        Self {
            doc_type,
            any_of: Vec::new(),
        }
    }

    /// Add a `field == value` alternative
    pub fn or_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.any_of.push((field.into(), value.into()));
        self
    }

    /// Evaluate against a decoded document
    pub fn matches(&self, doc: &Value) -> bool {
        if doc.get("docType").and_then(Value::as_str) != Some(self.doc_type.as_str()) {
            return false;
        }
        self.any_of.is_empty()
            || self
                .any_of
                .iter()
                .any(|(field, value)| doc.get(field).and_then(Value::as_str) == Some(value.as_str()))
    }

    /// Evaluate against raw document bytes; non-JSON values never match
    pub fn matches_bytes(&self, bytes: &[u8]) -> bool {
        serde_json::from_slice::<Value>(bytes)
            .map(|doc| self.matches(&doc))
            .unwrap_or(false)
    }
}

/// State access for one invocation
pub trait ChaincodeStub {
    /// Unique id of the invocation, assigned by the platform
    fn tx_id(&self) -> &str;

    /// Platform timestamp, identical on every validating node
    fn tx_timestamp(&self) -> DateTime<Utc>;

    /// Read a key
    fn get_state(&mut self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a key
    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Documents matching a selector, in whatever order the store yields them
    fn query(&mut self, selector: &Selector) -> Result<Vec<(String, Vec<u8>)>>;

    /// Platform timestamp as Unix seconds
    fn tx_unix_time(&self) -> i64 {
        self.tx_timestamp().timestamp()
    }
}

/// Read/write-set collecting execution of one invocation
pub struct Simulation<'a> {
    world: &'a dyn WorldState,
    rwset: ReadWriteSet,
    timestamp: DateTime<Utc>,
}

impl std::fmt::Debug for Simulation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("rwset", &self.rwset)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

impl<'a> Simulation<'a> {
    /// Start a simulation against the current world state
    pub fn new(world: &'a dyn WorldState, tx_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            world,
            rwset: ReadWriteSet::new(tx_id),
            timestamp,
        }
    }

    /// Finish and hand the collected sets to the committer
    pub fn into_rwset(self) -> ReadWriteSet {
        self.rwset
    }

    /// Pending writes
    pub fn writes(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.rwset.writes
    }
}

impl ChaincodeStub for Simulation<'_> {
    fn tx_id(&self) -> &str {
        &self.rwset.tx_id
    }

    fn tx_timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn get_state(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        if key.is_empty() {
            return Err(Error::validation("state key must not be empty"));
        }
        if let Some(pending) = self.rwset.writes.get(key) {
            return Ok(Some(pending.clone()));
        }

        let current = self.world.get(key)?;
        // Keep the first observed version; a later read must not mask a conflict
        self.rwset
            .reads
            .entry(key.to_string())
            .or_insert_with(|| current.as_ref().map(|v| v.version));
        Ok(current.map(|v| v.value))
    }

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        if key.is_empty() {
            return Err(Error::validation("state key must not be empty"));
        }
        self.rwset.writes.insert(key.to_string(), value);
        Ok(())
    }

    fn query(&mut self, selector: &Selector) -> Result<Vec<(String, Vec<u8>)>> {
        // Committed state only, pending writes of this invocation are not visible
        self.world.query(selector)
    }
}
