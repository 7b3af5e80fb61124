use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::assembler::PrintJobAssembler;
use super::classifier::{classify, Classification};
use super::issuance::{IssuanceError, UacQidIssuer};
use super::request::{FulfilmentRequest, RequestDecodeError};
use crate::store::{ActionStore, ActionType, JobId, StoreError};
use crate::transport::MessageHandler;

/// Turns fulfilment requests into queued print jobs.
pub struct FulfilmentRequestService<S, I> {
    store: Arc<S>,
    assembler: PrintJobAssembler<I>,
}

/// Result of a request that was handled without error. Only `Queued` writes anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfilmentOutcome {
    Queued {
        job_id: JobId,
        case_ref: i64,
        action_type: ActionType,
        issued_pairs: usize,
    },
    Ignored {
        fulfilment_code: String,
    },
    Unclassified {
        fulfilment_code: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum FulfilmentError {
    #[error(transparent)]
    Decode(#[from] RequestDecodeError),
    #[error("fulfilment {fulfilment_code} has no caseId")]
    MissingCaseId { fulfilment_code: String },
    #[error("fulfilment caseId '{value}' is not a UUID: {source}")]
    InvalidCaseId {
        value: String,
        #[source]
        source: uuid::Error,
    },
    #[error("case {0} not found")]
    CaseNotFound(Uuid),
    #[error(transparent)]
    Issuance(#[from] IssuanceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl<S, I> FulfilmentRequestService<S, I>
where
    S: ActionStore + 'static,
    I: UacQidIssuer + 'static,
{
    pub fn new(store: Arc<S>, issuer: Arc<I>) -> Self {
        Self {
            store,
            assembler: PrintJobAssembler::new(issuer),
        }
    }

    pub fn process_bytes(&self, body: &[u8]) -> Result<FulfilmentOutcome, FulfilmentError> {
        let request = FulfilmentRequest::decode(body)?;
        self.process(request)
    }

    /// Classifies the request and, for printable codes, queues one print job.
    ///
    /// Pairs are issued before the store transaction opens. The job and the links
    /// for its issued pairs are then committed together, so a failed commit
    /// leaves neither behind.
    pub fn process(
        &self,
        request: FulfilmentRequest,
    ) -> Result<FulfilmentOutcome, FulfilmentError> {
        let category = match classify(&request.fulfilment_code) {
            Classification::Print(category) => category,
            Classification::NoAction => {
                debug!(
                    fulfilment_code = %request.fulfilment_code,
                    "sms fulfilment ignored"
                );
                return Ok(FulfilmentOutcome::Ignored {
                    fulfilment_code: request.fulfilment_code,
                });
            }
            Classification::Unclassified => {
                warn!(
                    fulfilment_code = %request.fulfilment_code,
                    "unexpected fulfilment code received"
                );
                return Ok(FulfilmentOutcome::Unclassified {
                    fulfilment_code: request.fulfilment_code,
                });
            }
        };

        let raw_case_id =
            request
                .case_id
                .as_deref()
                .ok_or_else(|| FulfilmentError::MissingCaseId {
                    fulfilment_code: request.fulfilment_code.clone(),
                })?;
        let case_id =
            Uuid::parse_str(raw_case_id).map_err(|source| FulfilmentError::InvalidCaseId {
                value: raw_case_id.to_string(),
                source,
            })?;

        let case = self
            .store
            .find_case(&case_id)?
            .ok_or(FulfilmentError::CaseNotFound(case_id))?;

        let job = self.assembler.assemble(&case, category, &request)?;
        let links = job.issued_links();
        let issued_pairs = links.len();

        let queued = self.store.transaction(|tx| {
            for link in links {
                tx.insert_uac_qid_link(link)?;
            }
            Ok::<_, FulfilmentError>(tx.enqueue_print_job(job)?)
        })?;

        info!(
            fulfilment_code = %queued.job.fulfilment_code,
            %case_id,
            case_ref = queued.job.case_ref,
            job_id = %queued.id,
            action_type = %queued.job.action_type,
            "print job queued"
        );

        Ok(FulfilmentOutcome::Queued {
            job_id: queued.id,
            case_ref: queued.job.case_ref,
            action_type: queued.job.action_type,
            issued_pairs,
        })
    }
}

impl<S, I> MessageHandler for FulfilmentRequestService<S, I>
where
    S: ActionStore + 'static,
    I: UacQidIssuer + 'static,
{
    type Error = FulfilmentError;

    fn handle(&self, body: &[u8]) -> Result<(), Self::Error> {
        self.process_bytes(body).map(|_| ())
    }
}
