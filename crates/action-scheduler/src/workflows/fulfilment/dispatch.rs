use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::store::{ActionStore, QueuedPrintJob, StoreError};
use crate::transport::{OutboundPublisher, PublishError};

pub const PRINTER_ROUTING_KEY: &str = "Action.Printer.binding";

/// Self-contained print record consumed by the printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintInstruction {
    pub address_line1: String,
    pub address_line2: String,
    pub address_line3: String,
    pub town_name: String,
    pub postcode: String,
    pub title: String,
    pub forename: String,
    pub surname: String,
    pub batch_id: Uuid,
    pub batch_quantity: u32,
    pub pack_code: String,
    pub action_type: String,
    pub case_ref: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iac_wales: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qid_wales: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_coordinator_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_officer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organisation_name: Option<String>,
}

impl PrintInstruction {
    /// `None` for a job that has not been batched yet.
    pub fn from_queued(queued: &QueuedPrintJob) -> Option<Self> {
        let job = &queued.job;
        let batch_id = job.batch_id?;

        Some(Self {
            address_line1: job.address_line1.clone(),
            address_line2: job.address_line2.clone(),
            address_line3: job.address_line3.clone(),
            town_name: job.town_name.clone(),
            postcode: job.postcode.clone(),
            title: job.contact.title.clone(),
            forename: job.contact.forename.clone(),
            surname: job.contact.surname.clone(),
            batch_id,
            batch_quantity: job.quantity,
            pack_code: job.fulfilment_code.clone(),
            action_type: job.action_type.name().to_string(),
            case_ref: job.case_ref,
            iac: job.uac_qid.as_ref().map(|pair| pair.uac.clone()),
            qid: job.uac_qid.as_ref().map(|pair| pair.qid.clone()),
            iac_wales: job.uac_qid_wales.as_ref().map(|pair| pair.uac.clone()),
            qid_wales: job.uac_qid_wales.as_ref().map(|pair| pair.qid.clone()),
            field_coordinator_id: job.field_coordinator_id.clone(),
            field_officer_id: job.field_officer_id.clone(),
            organisation_name: job.organisation_name.clone(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("print instruction could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Publishes batched jobs and removes them from the queue in one transaction.
pub struct Dispatcher<S, P> {
    store: Arc<S>,
    publisher: Arc<P>,
    exchange: String,
}

impl<S, P> Dispatcher<S, P>
where
    S: ActionStore + 'static,
    P: OutboundPublisher + 'static,
{
    pub fn new(store: Arc<S>, publisher: Arc<P>, exchange: impl Into<String>) -> Self {
        Self {
            store,
            publisher,
            exchange: exchange.into(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Returns the published instructions. A publish failure keeps every job queued.
    pub fn dispatch(&self) -> Result<Vec<PrintInstruction>, DispatchError> {
        let result = self.store.transaction(|tx| {
            let batched = tx.batched_print_jobs()?;
            if batched.is_empty() {
                return Ok::<_, DispatchError>(Vec::new());
            }

            let instructions: Vec<PrintInstruction> =
                batched.iter().filter_map(PrintInstruction::from_queued).collect();
            for queued in &batched {
                tx.remove_print_job(queued.id)?;
            }

            let payloads = instructions
                .iter()
                .map(serde_json::to_vec)
                .collect::<Result<Vec<_>, _>>()?;
            self.publisher
                .publish_all(&self.exchange, PRINTER_ROUTING_KEY, payloads)?;

            Ok(instructions)
        });

        match &result {
            Ok(instructions) if !instructions.is_empty() => info!(
                exchange = %self.exchange,
                routing_key = PRINTER_ROUTING_KEY,
                instructions = instructions.len(),
                "print instructions dispatched"
            ),
            Ok(_) => {}
            Err(err) => warn!(
                exchange = %self.exchange,
                error = %err,
                "dispatch rolled back"
            ),
        }

        result
    }
}
