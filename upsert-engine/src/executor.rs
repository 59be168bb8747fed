//! The batch executor: issues the create and update calls for a reconciled
//! plan and runs the corrective pass for constrained fields.
//!
//! At most one batched create call and one batched update call are made, plus
//! up to two follow-up update calls when a constrained field's echoed value
//! does not match the desired one. Remotes that enforce one-directional
//! transitions on such fields silently retain the old value on a disallowed
//! write; clearing the field first and re-applying the desired value gets the
//! write through.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use destination_common::error::DestinationError;

use crate::client::{
    BatchErrorEntry, BatchResponse, EchoedProperties, RemoteBatchClient, WriteInput,
};
use crate::identifier::IdentifierKey;
use crate::reconcile::ReconcilePlan;
use crate::record::UpsertRecord;

/// Per-record result of an executed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordResult {
    Success {
        remote_id: String,
        properties: EchoedProperties,
    },
    Failed {
        category: String,
        message: String,
    },
}

impl RecordResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RecordResult::Success { .. })
    }

    pub fn remote_id(&self) -> Option<&str> {
        match self {
            RecordResult::Success { remote_id, .. } => Some(remote_id),
            RecordResult::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub key: IdentifierKey,
    pub result: RecordResult,
}

/// Ordered per-record results; one entry per input record, in input order.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub records: Vec<RecordOutcome>,
}

impl BatchOutcome {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.records.iter().filter(|r| r.result.is_success())
    }
}

/// Execute a reconciled plan against the remote.
///
/// Transport-level failures of any call propagate as errors. Per-record error
/// entries in a response body become `Failed` outcomes for the affected
/// identifiers only; the rest of the batch is unaffected.
pub async fn execute(
    plan: ReconcilePlan,
    client: &dyn RemoteBatchClient,
    id_property: &str,
) -> Result<BatchOutcome, DestinationError> {
    let mut results: HashMap<IdentifierKey, RecordResult> = HashMap::new();

    if !plan.create_queue.is_empty() {
        let inputs: Vec<WriteInput> = plan
            .create_queue
            .iter()
            .map(|record| WriteInput {
                id: None,
                properties: record.properties.clone(),
            })
            .collect();
        debug!(records = inputs.len(), "issuing batched create");
        let labels = [("call", "create")];
        metrics::counter!("upsert_batch_calls_total", &labels).increment(1);
        let response = client.batch_create(inputs).await?;
        collect_create_results(&plan.create_queue, &response, id_property, &mut results)?;
    }

    let mut reset_inputs: Vec<WriteInput> = Vec::new();
    let mut reapply_inputs: Vec<WriteInput> = Vec::new();

    if !plan.update_queue.is_empty() {
        let inputs: Vec<WriteInput> = plan
            .update_queue
            .iter()
            .map(|record| WriteInput {
                id: record.remote_id().map(str::to_string),
                properties: record.properties.clone(),
            })
            .collect();
        debug!(records = inputs.len(), "issuing batched update");
        let labels = [("call", "update")];
        metrics::counter!("upsert_batch_calls_total", &labels).increment(1);
        let response = client.batch_update(inputs).await?;

        for result in &response.results {
            let Some(record) = plan
                .update_queue
                .iter()
                .find(|record| record.remote_id() == Some(result.id.as_str()))
            else {
                warn!(remote_id = %result.id, "update result matched no queued record");
                continue;
            };

            for (field, desired) in &record.constrained {
                if result.property(field) != Some(desired.as_str()) {
                    reset_inputs.push(single_field_update(&result.id, field, String::new()));
                    reapply_inputs.push(single_field_update(&result.id, field, desired.clone()));
                }
            }

            results.insert(
                record.key.clone(),
                RecordResult::Success {
                    remote_id: result.id.clone(),
                    properties: result.properties.clone(),
                },
            );
        }

        // Update error entries name records by the remote id the inputs
        // carried, not by identifier value.
        collect_error_entries(
            &response.errors,
            |id| {
                plan.update_queue
                    .iter()
                    .find(|record| record.remote_id() == Some(id))
                    .or_else(|| {
                        plan.update_queue
                            .iter()
                            .find(|record| record.key == IdentifierKey::normalize(id))
                    })
                    .map(|record| record.key.clone())
            },
            &mut results,
        )?;
    }

    if !reset_inputs.is_empty() {
        debug!(
            records = reset_inputs.len(),
            "constrained field write did not take effect; resetting and re-applying"
        );
        metrics::counter!("upsert_constrained_retries_total")
            .increment(reset_inputs.len() as u64);
        // A reset failure surfaces here and leaves the field cleared with no
        // compensating write. Documented risk.
        client.batch_update(reset_inputs).await?;
        client.batch_update(reapply_inputs).await?;
    }

    let mut outcome = BatchOutcome::default();
    for key in plan.order {
        let result = results.remove(&key).unwrap_or_else(|| {
            warn!(identifier = %key, "remote response did not cover this record");
            RecordResult::Failed {
                category: "MISSING_RESULT".to_string(),
                message: "the remote response did not include this record".to_string(),
            }
        });
        outcome.records.push(RecordOutcome { key, result });
    }
    Ok(outcome)
}

fn single_field_update(remote_id: &str, field: &str, value: String) -> WriteInput {
    WriteInput {
        id: Some(remote_id.to_string()),
        properties: BTreeMap::from([(field.to_string(), value)]),
    }
}

fn collect_create_results(
    queue: &[UpsertRecord],
    response: &BatchResponse,
    id_property: &str,
    results: &mut HashMap<IdentifierKey, RecordResult>,
) -> Result<(), DestinationError> {
    for result in &response.results {
        let Some(record) = result
            .property(id_property)
            .and_then(|value| queue.iter().find(|record| record.key.as_str() == value))
        else {
            warn!(remote_id = %result.id, "create result matched no queued record");
            continue;
        };
        results.insert(
            record.key.clone(),
            RecordResult::Success {
                remote_id: result.id.clone(),
                properties: result.properties.clone(),
            },
        );
    }
    collect_error_entries(
        &response.errors,
        |id| {
            let key = IdentifierKey::normalize(id);
            queue
                .iter()
                .find(|record| record.key == key)
                .map(|record| record.key.clone())
        },
        results,
    )
}

/// Error entries naming ids become per-record failures, with the category and
/// message passed through verbatim. `resolve` maps each context id back to a
/// pending record's key; ids resolving to none are skipped. An entry naming no
/// ids at all cannot be attributed and fails the batch.
fn collect_error_entries(
    errors: &[BatchErrorEntry],
    resolve: impl Fn(&str) -> Option<IdentifierKey>,
    results: &mut HashMap<IdentifierKey, RecordResult>,
) -> Result<(), DestinationError> {
    for error in errors {
        if error.context.ids.is_empty() {
            return Err(DestinationError::fatal_remote(
                error.category.clone(),
                error.message.clone(),
            ));
        }
        for id in &error.context.ids {
            let Some(key) = resolve(id) else {
                warn!(id = %id, "error entry named no pending record");
                continue;
            };
            results.insert(
                key,
                RecordResult::Failed {
                    category: error.category.clone(),
                    message: error.message.clone(),
                },
            );
        }
    }
    Ok(())
}
