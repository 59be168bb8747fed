//! Batched upsert-by-identifier reconciliation engine.
//!
//! Given a batch of resolved payloads, the engine reconciles them against the
//! remote system's existing records (read, then create-or-update), handles
//! partial failures per record, and runs the corrective pass for fields the
//! remote protects against non-monotonic writes. The flow is strictly
//! sequential: map, batched read, reconcile, batched create/update, optional
//! reset/re-apply. Each invocation is independent; the only state that
//! outlives it is the caller's [`TransactionContext`].

pub mod client;
pub mod executor;
pub mod identifier;
pub mod mapper;
pub mod reconcile;
pub mod record;

use tracing::debug;

use destination_common::error::DestinationError;
use destination_common::transaction::TransactionContext;

use crate::client::{BatchReadRequest, ReadInput, RemoteBatchClient};
use crate::executor::{execute, BatchOutcome};
use crate::mapper::{map_batch, RecordSpec};
use crate::reconcile::reconcile;

/// Per-destination parameters of an upsert flow.
#[derive(Debug, Clone)]
pub struct UpsertSpec {
    /// The remote property used as the dedupe key, e.g. `email`.
    pub id_property: &'static str,
    /// Remote fields the lookup must echo: the id property, the alias
    /// property if any, and every constrained field.
    pub lookup_properties: Vec<&'static str>,
    /// Remote property holding `;`-separated secondary identifiers for an
    /// entity, when the remote supports aliases.
    pub alias_property: Option<&'static str>,
    /// The remote's per-call record limit. Batches above it are rejected;
    /// chunking is the caller's concern.
    pub max_batch_size: usize,
    /// Transaction-context key to store resulting remote ids under, for
    /// follow-up actions in the same transaction.
    pub tx_key: Option<&'static str>,
}

/// Run the full upsert flow for one batch.
///
/// Every input record is represented in the returned outcome exactly once,
/// unless a fatal lookup or call error aborts the batch as a whole.
pub async fn run_upsert(
    specs: Vec<RecordSpec>,
    upsert: &UpsertSpec,
    client: &dyn RemoteBatchClient,
    tx: &mut TransactionContext,
) -> Result<BatchOutcome, DestinationError> {
    if specs.len() > upsert.max_batch_size {
        return Err(DestinationError::Validation(format!(
            "batch of {} records exceeds the remote limit of {} per call",
            specs.len(),
            upsert.max_batch_size
        )));
    }

    let batch = map_batch(specs, upsert.id_property)?;
    if batch.is_empty() {
        return Ok(BatchOutcome::default());
    }

    let read_request = BatchReadRequest {
        id_property: upsert.id_property.to_string(),
        properties: upsert
            .lookup_properties
            .iter()
            .map(|p| p.to_string())
            .collect(),
        inputs: batch
            .keys()
            .map(|key| ReadInput {
                id: key.as_str().to_string(),
            })
            .collect(),
    };
    let read_response = client.batch_read(read_request).await?;

    let plan = reconcile(
        batch,
        &read_response,
        upsert.id_property,
        upsert.alias_property,
    )?;
    debug!(
        total = plan.len(),
        create = plan.create_queue.len(),
        update = plan.update_queue.len(),
        "batch reconciled"
    );
    let labels = [("action", "create")];
    metrics::counter!("upsert_records_classified_total", &labels)
        .increment(plan.create_queue.len() as u64);
    let labels = [("action", "update")];
    metrics::counter!("upsert_records_classified_total", &labels)
        .increment(plan.update_queue.len() as u64);

    let outcome = execute(plan, client, upsert.id_property).await?;

    if let Some(tx_key) = upsert.tx_key {
        // Last successful record wins, mirroring the single-record flow.
        if let Some(remote_id) = outcome
            .successes()
            .last()
            .and_then(|record| record.result.remote_id())
        {
            tx.set(tx_key, remote_id);
        }
    }

    Ok(outcome)
}
