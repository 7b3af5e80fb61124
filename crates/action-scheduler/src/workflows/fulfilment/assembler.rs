use std::sync::Arc;

use tracing::debug;

use super::classifier::ActionCategory;
use super::issuance::{IssuanceError, UacQidIssuer};
use super::request::FulfilmentRequest;
use crate::store::{Case, PrintJob};

/// Builds queued print jobs, issuing UAC/QID pairs for personalised products.
pub struct PrintJobAssembler<I> {
    issuer: Arc<I>,
}

impl<I> PrintJobAssembler<I>
where
    I: UacQidIssuer,
{
    pub fn new(issuer: Arc<I>) -> Self {
        Self { issuer }
    }

    /// Fails as a whole if any issuance call fails; nothing partial is returned.
    pub fn assemble(
        &self,
        case: &Case,
        category: ActionCategory,
        request: &FulfilmentRequest,
    ) -> Result<PrintJob, IssuanceError> {
        let contact = request.contact.clone().unwrap_or_default();

        let (uac_qid, uac_qid_wales) = match category.questionnaire_type {
            Some(questionnaire) => {
                let primary = self.issuer.issue(&case.case_id, questionnaire.primary)?;
                let secondary = questionnaire
                    .secondary_language
                    .map(|questionnaire_type| self.issuer.issue(&case.case_id, questionnaire_type))
                    .transpose()?;
                debug!(
                    case_id = %case.case_id,
                    questionnaire_type = questionnaire.primary,
                    bilingual = secondary.is_some(),
                    "issued uac/qid for individual fulfilment"
                );
                (Some(primary), secondary)
            }
            None => (None, None),
        };

        Ok(PrintJob {
            fulfilment_code: request.fulfilment_code.clone(),
            case_id: case.case_id,
            case_ref: case.case_ref,
            action_type: category.action_type,
            address_line1: case.address.address_line1.clone(),
            address_line2: case.address.address_line2.clone(),
            address_line3: case.address.address_line3.clone(),
            town_name: case.address.town_name.clone(),
            postcode: case.address.postcode.clone(),
            contact,
            field_coordinator_id: request.field_coordinator_id.clone(),
            field_officer_id: request.field_officer_id.clone(),
            organisation_name: request.organisation_name.clone(),
            uac_qid,
            uac_qid_wales,
            quantity: 1,
            batch_id: None,
        })
    }
}
