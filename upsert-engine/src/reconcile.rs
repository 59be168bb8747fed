//! The reconciler: merges a batched lookup response into the pending-record
//! map, classifying every record as create or update.
//!
//! Transition rules, applied once per lookup response:
//! 1. a successful result whose id property (or one of its `;`-separated
//!    aliases) matches a pending key marks that record `Update` with the
//!    remote id;
//! 2. a not-found error entry marks every affected identifier `Create`;
//! 3. any other error category aborts the batch before any write is issued;
//! 4. a record left `Undetermined` after all results were processed is an
//!    integrity error.

use destination_common::error::DestinationError;
use tracing::warn;

use crate::client::{BatchResponse, BatchResult};
use crate::identifier::IdentifierKey;
use crate::record::{UpsertAction, UpsertBatch, UpsertRecord};

/// The two work queues reconciliation produces. Every input record lands in
/// exactly one of them; `order` keeps the original input order so the batch
/// outcome can be reported in it.
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    pub create_queue: Vec<UpsertRecord>,
    pub update_queue: Vec<UpsertRecord>,
    pub order: Vec<IdentifierKey>,
}

impl ReconcilePlan {
    pub fn len(&self) -> usize {
        self.create_queue.len() + self.update_queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.create_queue.is_empty() && self.update_queue.is_empty()
    }
}

/// Apply a lookup response to the pending map and partition it into work
/// queues. Idempotent over the same response: transitions only move records
/// out of `Undetermined`, and re-applying a result sets the same value again.
pub fn reconcile(
    mut batch: UpsertBatch,
    response: &BatchResponse,
    id_property: &str,
    alias_property: Option<&str>,
) -> Result<ReconcilePlan, DestinationError> {
    apply_lookup(&mut batch, response, id_property, alias_property)?;
    partition(batch)
}

pub fn apply_lookup(
    batch: &mut UpsertBatch,
    response: &BatchResponse,
    id_property: &str,
    alias_property: Option<&str>,
) -> Result<(), DestinationError> {
    for result in &response.results {
        match match_result_key(batch, result, id_property, alias_property) {
            Some(key) => {
                if let Some(record) = batch.get_mut(key.as_str()) {
                    record.action = UpsertAction::Update {
                        remote_id: result.id.clone(),
                    };
                }
            }
            None => {
                warn!(
                    remote_id = %result.id,
                    "lookup result matched no pending record"
                );
            }
        }
    }

    for error in &response.errors {
        if error.is_not_found() {
            for id in &error.context.ids {
                if let Some(record) = batch.get_mut(id.as_str()) {
                    if record.action == UpsertAction::Undetermined {
                        record.action = UpsertAction::Create;
                    }
                }
            }
        } else {
            return Err(DestinationError::fatal_remote(
                error.category.clone(),
                error.message.clone(),
            ));
        }
    }

    Ok(())
}

fn partition(batch: UpsertBatch) -> Result<ReconcilePlan, DestinationError> {
    let mut plan = ReconcilePlan::default();
    for record in batch.into_records() {
        plan.order.push(record.key.clone());
        match &record.action {
            UpsertAction::Create => plan.create_queue.push(record),
            UpsertAction::Update { .. } => plan.update_queue.push(record),
            UpsertAction::Undetermined => {
                return Err(DestinationError::Integrity(format!(
                    "record '{}' was not covered by the lookup response",
                    record.key
                )));
            }
        }
    }
    Ok(plan)
}

/// Find the pending key a lookup result belongs to.
///
/// The primary id property is matched verbatim against the (normalized) key
/// set, as is each entry of the `;`-separated alias list. Remotes returning
/// mixed-case values here will not match; case-folding is applied at mapping
/// time only.
fn match_result_key(
    batch: &UpsertBatch,
    result: &BatchResult,
    id_property: &str,
    alias_property: Option<&str>,
) -> Option<IdentifierKey> {
    if let Some(primary) = result.property(id_property) {
        if let Some(record) = batch.get(primary) {
            return Some(record.key.clone());
        }
    }

    let aliases = alias_property.and_then(|property| result.property(property))?;
    let aliases: Vec<&str> = aliases.split(';').collect();
    batch
        .keys()
        .find(|key| aliases.contains(&key.as_str()))
        .cloned()
}
