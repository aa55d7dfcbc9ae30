//! First-seen sequence store.
//!
//! Every identity key gets a number the first time it is seen, and keeps that
//! number forever. Numbers come from a monotonically increasing counter, so a
//! higher number always means "first seen later".
//!
//! The record is persisted as one JSON document under a fixed key of an
//! injected [`KvStore`]:
//!
//! ```json
//! {"counter": 3, "map": {"c:s1": 1, "u:example.com/a": 2, "t:hits|storm": 3}}
//! ```
//!
//! Persisted state is never trusted: missing, unparsable, or wrongly shaped
//! values load as an empty record so a bad write can never block ordering.
//! Writes happen only when a cycle assigns at least one new key, and a failed
//! write is logged rather than returned.

pub mod file;
pub mod memory;
pub mod sqlite;

pub use file::FileKv;
pub use memory::MemoryKv;
pub use sqlite::SqliteKv;

use crate::error::StoreError;
use crate::identity::IdentityKey;
use crate::lock::CycleLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument, warn};

/// Storage key the record is persisted under.
pub const SEQUENCE_STORAGE_KEY: &str = "newsline.sequence.v1";

/// Largest counter accepted on load. Keeps every number exactly
/// representable for JSON consumers that read numbers as doubles.
pub const MAX_COUNTER: u64 = (1 << 53) - 1;

// ---------------------------------------------------------------------------
// KvStore
// ---------------------------------------------------------------------------

/// Durable string-keyed storage for the sequence record.
pub trait KvStore {
    /// Read the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Take an exclusive hold over the backing for one load-assign-save
    /// cycle. Backends that cannot be shared across processes return `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken in time.
    fn lock_cycle(&self) -> Result<Option<CycleLock>, StoreError> {
        Ok(None)
    }

    /// Short human description of where state lives.
    fn describe(&self) -> String;
}

impl<T: KvStore + ?Sized> KvStore for Box<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn lock_cycle(&self) -> Result<Option<CycleLock>, StoreError> {
        (**self).lock_cycle()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

// ---------------------------------------------------------------------------
// SequenceRecord
// ---------------------------------------------------------------------------

/// Persisted first-seen state: the counter and every key's number.
///
/// Invariants: every number in `map` is `<= counter`, numbers are never
/// reassigned, and `counter` never decreases outside an explicit reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub counter: u64,
    pub map: BTreeMap<String, u64>,
}

/// How a persisted value was interpreted on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    /// Nothing stored yet.
    Missing,
    /// Stored value parsed cleanly.
    Loaded,
    /// Stored value parsed, but `counter` was behind the map and was raised.
    Repaired,
    /// Stored value was unusable and was replaced by an empty record.
    Corrupt,
}

impl SequenceRecord {
    /// Interpret a persisted value.
    #[must_use]
    pub fn parse(raw: &str) -> (Self, LoadStatus) {
        let Ok(mut record) = serde_json::from_str::<Self>(raw) else {
            return (Self::default(), LoadStatus::Corrupt);
        };

        let highest = record.map.values().copied().max().unwrap_or(0);
        if highest.max(record.counter) > MAX_COUNTER {
            return (Self::default(), LoadStatus::Corrupt);
        }
        if highest > record.counter {
            record.counter = highest;
            return (record, LoadStatus::Repaired);
        }
        (record, LoadStatus::Loaded)
    }

    /// Number already assigned to `key`.
    #[must_use]
    pub fn get(&self, key: &IdentityKey) -> Option<u64> {
        self.map.get(key.as_str()).copied()
    }

    /// Number of keys seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Return the existing number for `key`, or assign the next one.
    /// The flag is `true` when a new number was assigned.
    ///
    /// Returns `None` for an unseen key once `counter` has reached
    /// [`MAX_COUNTER`]; the record is left unchanged.
    pub fn get_or_assign(&mut self, key: &IdentityKey) -> Option<(u64, bool)> {
        if let Some(existing) = self.get(key) {
            return Some((existing, false));
        }
        if self.counter >= MAX_COUNTER {
            return None;
        }
        self.counter += 1;
        self.map.insert(key.as_str().to_string(), self.counter);
        Some((self.counter, true))
    }

    /// Entries sorted by number, highest (most recently first seen) first.
    #[must_use]
    pub fn entries_newest_first(&self) -> Vec<(&str, u64)> {
        let mut entries: Vec<(&str, u64)> =
            self.map.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }
}

// ---------------------------------------------------------------------------
// SequenceStore
// ---------------------------------------------------------------------------

/// Result of one [`SequenceStore::assign`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    /// Number for every key passed in.
    pub sequences: HashMap<IdentityKey, u64>,
    /// How many keys were new in this call.
    pub added: usize,
    /// Whether the record was written back.
    pub persisted: bool,
    /// Counter after assignment.
    pub counter: u64,
}

impl Assignment {
    #[must_use]
    pub fn sequence(&self, key: &IdentityKey) -> Option<u64> {
        self.sequences.get(key).copied()
    }
}

/// Sole owner and writer of the persisted [`SequenceRecord`].
#[derive(Debug)]
pub struct SequenceStore<S> {
    kv: S,
    storage_key: String,
}

impl<S: KvStore> SequenceStore<S> {
    /// Store backed by `kv` under [`SEQUENCE_STORAGE_KEY`].
    pub fn new(kv: S) -> Self {
        Self::with_storage_key(kv, SEQUENCE_STORAGE_KEY)
    }

    /// Store backed by `kv` under a custom key.
    pub fn with_storage_key(kv: S, storage_key: impl Into<String>) -> Self {
        Self {
            kv,
            storage_key: storage_key.into(),
        }
    }

    /// Borrow the backing store.
    pub const fn kv(&self) -> &S {
        &self.kv
    }

    /// Load the record, reporting how the persisted value was interpreted.
    ///
    /// A backend that holds unparsable data reports `Corrupt`; other read
    /// failures are treated like a missing value.
    pub fn inspect(&self) -> (SequenceRecord, LoadStatus) {
        let raw = match self.kv.get(&self.storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return (SequenceRecord::default(), LoadStatus::Missing),
            Err(err) if err.is_invalid_data() => {
                warn!(
                    code = %err.code(),
                    backend = %self.kv.describe(),
                    "sequence state is malformed, starting fresh: {err}"
                );
                return (SequenceRecord::default(), LoadStatus::Corrupt);
            }
            Err(err) => {
                warn!(
                    code = %err.code(),
                    backend = %self.kv.describe(),
                    "sequence state unreadable, starting fresh: {err}"
                );
                return (SequenceRecord::default(), LoadStatus::Missing);
            }
        };

        let (record, status) = SequenceRecord::parse(&raw);
        match status {
            LoadStatus::Corrupt => warn!(
                backend = %self.kv.describe(),
                "sequence state is malformed, starting fresh"
            ),
            LoadStatus::Repaired => warn!(
                counter = record.counter,
                "sequence counter was behind its map, raised to highest assigned"
            ),
            LoadStatus::Missing | LoadStatus::Loaded => {}
        }
        (record, status)
    }

    /// Load the record. Never fails; unusable state yields an empty record.
    pub fn load(&self) -> SequenceRecord {
        self.inspect().0
    }

    /// Write the record back unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the backend write fails.
    pub fn save(&mut self, record: &SequenceRecord) -> Result<(), StoreError> {
        let raw = serde_json::to_string(record)?;
        self.kv.set(&self.storage_key, &raw)
    }

    /// Replace the persisted record with an empty one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        let _lock = self.kv.lock_cycle()?;
        self.save(&SequenceRecord::default())
    }

    /// Number every key, assigning new numbers to unseen keys in input order,
    /// and persist the record if anything was added.
    ///
    /// Load, assignment and save run under the backend's cycle lock when it
    /// has one. Lock and write failures are logged; the returned numbers are
    /// valid for this cycle either way.
    #[instrument(skip_all, fields(keys = keys.len()))]
    pub fn assign(&mut self, keys: &[IdentityKey]) -> Assignment {
        let lock = match self.kv.lock_cycle() {
            Ok(lock) => lock,
            Err(err) => {
                warn!(code = %err.code(), "running sequence cycle unlocked: {err}");
                None
            }
        };

        let mut record = self.load();
        let mut sequences = HashMap::with_capacity(keys.len());
        let mut added = 0;
        let mut unnumbered = 0;
        for key in keys {
            let Some((sequence, is_new)) = record.get_or_assign(key) else {
                // Numbered for this cycle only; never written back.
                unnumbered += 1;
                sequences.insert(key.clone(), record.counter + unnumbered);
                continue;
            };
            if is_new {
                added += 1;
            }
            sequences.insert(key.clone(), sequence);
        }
        if unnumbered > 0 {
            warn!(
                unnumbered,
                counter = record.counter,
                "sequence counter exhausted, new keys are not persisted"
            );
        }

        let persisted = if added > 0 {
            match self.save(&record) {
                Ok(()) => true,
                Err(err) => {
                    warn!(
                        code = %err.code(),
                        added,
                        "failed to persist sequence state: {err}"
                    );
                    false
                }
            }
        } else {
            false
        };
        drop(lock);

        debug!(added, persisted, counter = record.counter, "sequence assignment complete");
        Assignment {
            sequences,
            added,
            persisted,
            counter: record.counter,
        }
    }
}
