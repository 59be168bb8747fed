use std::collections::{BTreeMap, HashMap};

use crate::identifier::IdentifierKey;

/// Classification of one pending record. Resolved exactly once by the
/// reconciler; `Create` and `Update` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertAction {
    /// Freshly mapped; the remote system has not been consulted yet.
    Undetermined,
    /// Lookup reported the identifier as not found.
    Create,
    /// Lookup matched an existing remote entity.
    Update { remote_id: String },
}

/// One record of a pending batch, keyed by its normalized identifier.
#[derive(Debug, Clone)]
pub struct UpsertRecord {
    pub key: IdentifierKey,
    /// Flattened field values. Immutable once the mapper has built them.
    pub properties: BTreeMap<String, String>,
    /// Fields subject to non-monotonic-write protection, with their desired
    /// values. The executor compares these against the update call's echo.
    pub constrained: BTreeMap<String, String>,
    pub action: UpsertAction,
}

impl UpsertRecord {
    pub fn remote_id(&self) -> Option<&str> {
        match &self.action {
            UpsertAction::Update { remote_id } => Some(remote_id),
            _ => None,
        }
    }
}

/// Insertion-ordered map of pending records.
///
/// Duplicate identifiers are last-write-wins on content while keeping the
/// first-seen position, so `BatchOutcome` ordering stays stable relative to
/// the input.
#[derive(Debug, Default)]
pub struct UpsertBatch {
    records: Vec<UpsertRecord>,
    index: HashMap<IdentifierKey, usize>,
}

impl UpsertBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: UpsertRecord) {
        match self.index.get(&record.key) {
            Some(&position) => self.records[position] = record,
            None => {
                self.index.insert(record.key.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&UpsertRecord> {
        self.index.get(key).map(|&position| &self.records[position])
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut UpsertRecord> {
        let position = *self.index.get(key)?;
        Some(&mut self.records[position])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &IdentifierKey> {
        self.records.iter().map(|record| &record.key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UpsertRecord> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<UpsertRecord> {
        self.records
    }
}
