use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::envelope::{EnvelopeError, InboundEvent, ResponseReceipt, UacUpdate};
use crate::store::{ActionStore, Case, StoreError, UacQidLink};
use crate::transport::MessageHandler;

/// Applies case lifecycle and UAC events to the store.
pub struct EventIngestor<S> {
    store: Arc<S>,
}

/// What a successfully applied event wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    CaseSaved { case_id: Uuid, case_ref: i64 },
    UacQidLinked { link_id: Uuid, case_id: Uuid },
    CaseReceipted { case_id: Uuid, first_receipt: bool },
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no case is linked to questionnaire id {0}")]
    UnknownQuestionnaire(String),
}

impl<S> EventIngestor<S>
where
    S: ActionStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Decodes and applies one raw event body.
    pub fn ingest_bytes(&self, body: &[u8]) -> Result<IngestOutcome, IngestError> {
        let event = InboundEvent::decode(body)?;
        self.ingest(event)
    }

    pub fn ingest(&self, event: InboundEvent) -> Result<IngestOutcome, IngestError> {
        match event {
            InboundEvent::CaseCreated(case) => self.save_case(case),
            InboundEvent::UacUpdated(update) => self.link_uac_qid(update),
            InboundEvent::ResponseReceived(receipt) => self.receipt(receipt),
        }
    }

    fn save_case(&self, case: Case) -> Result<IngestOutcome, IngestError> {
        let case_id = case.case_id;
        let case_ref = case.case_ref;
        self.store
            .transaction(|tx| tx.save_case(case).map_err(IngestError::from))?;

        info!(%case_id, case_ref, "case created");
        Ok(IngestOutcome::CaseSaved { case_id, case_ref })
    }

    fn link_uac_qid(&self, update: UacUpdate) -> Result<IngestOutcome, IngestError> {
        let link = UacQidLink {
            id: Uuid::new_v4(),
            uac: update.uac,
            qid: update.qid,
            case_id: update.case_id,
        };
        let link_id = link.id;
        let case_id = link.case_id;
        self.store
            .transaction(|tx| tx.insert_uac_qid_link(link).map_err(IngestError::from))?;

        debug!(%case_id, %link_id, "uac/qid link stored");
        Ok(IngestOutcome::UacQidLinked { link_id, case_id })
    }

    /// The QID must already be linked; otherwise the event is redelivered.
    fn receipt(&self, receipt: ResponseReceipt) -> Result<IngestOutcome, IngestError> {
        let (case_id, first_receipt) = self.store.transaction(|tx| {
            let case_id = tx
                .case_id_for_qid(&receipt.qid)?
                .ok_or_else(|| IngestError::UnknownQuestionnaire(receipt.qid.clone()))?;
            let first_receipt = tx.mark_receipted(&case_id)?;
            Ok::<_, IngestError>((case_id, first_receipt))
        })?;

        if first_receipt {
            info!(%case_id, qid = %receipt.qid, "case receipted");
        } else {
            debug!(%case_id, qid = %receipt.qid, "case already receipted");
        }
        Ok(IngestOutcome::CaseReceipted {
            case_id,
            first_receipt,
        })
    }
}

impl<S> MessageHandler for EventIngestor<S>
where
    S: ActionStore + 'static,
{
    type Error = IngestError;

    fn handle(&self, body: &[u8]) -> Result<(), Self::Error> {
        self.ingest_bytes(body).map(|_| ())
    }
}
