use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::store::{ActionStore, StoreError};

/// Stamps every unbatched print job with a shared batch id and pack quantity.
pub struct FulfilmentBatchProcessor<S> {
    store: Arc<S>,
}

/// Batch written by one successful pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub jobs: usize,
    /// Jobs per fulfilment code. Each job's quantity is its code's entry.
    pub quantities: BTreeMap<String, u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl<S> FulfilmentBatchProcessor<S>
where
    S: ActionStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns `None` when there was nothing to batch.
    pub fn assign_batch(&self) -> Result<Option<BatchSummary>, BatchError> {
        let summary = self.store.transaction(|tx| {
            let jobs = tx.unbatched_print_jobs()?;
            if jobs.is_empty() {
                return Ok::<_, BatchError>(None);
            }

            let mut quantities: BTreeMap<String, u32> = BTreeMap::new();
            for queued in &jobs {
                *quantities
                    .entry(queued.job.fulfilment_code.clone())
                    .or_default() += 1;
            }

            let batch_id = Uuid::new_v4();
            for queued in &jobs {
                let quantity = quantities
                    .get(&queued.job.fulfilment_code)
                    .copied()
                    .unwrap_or(1);
                tx.assign_batch(queued.id, batch_id, quantity)?;
            }

            Ok(Some(BatchSummary {
                batch_id,
                jobs: jobs.len(),
                quantities,
            }))
        })?;

        match &summary {
            Some(batch) => info!(
                batch_id = %batch.batch_id,
                jobs = batch.jobs,
                pack_codes = batch.quantities.len(),
                "fulfilment batch assigned"
            ),
            None => debug!("no unbatched print jobs"),
        }

        Ok(summary)
    }
}
