use crate::store::{InitialContactType, UacQidLink, UacQidPair};

/// Access codes printed on one initial-contact pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseUacQids {
    pub primary: UacQidPair,
    pub welsh: Option<UacQidPair>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UacQidSelectionError {
    #[error("case has no UAC/QID link with questionnaire type {0}")]
    Missing(&'static str),
}

/// Picks the newest link of each questionnaire type the pack needs.
///
/// Links are expected in the order they were stored.
pub fn select_uac_qids(
    action_type: InitialContactType,
    links: &[UacQidLink],
) -> Result<CaseUacQids, UacQidSelectionError> {
    let primary = latest_of_type(links, action_type.primary_questionnaire_type())?;
    let welsh = action_type
        .welsh_questionnaire_type()
        .map(|questionnaire_type| latest_of_type(links, questionnaire_type))
        .transpose()?;

    Ok(CaseUacQids { primary, welsh })
}

fn latest_of_type(
    links: &[UacQidLink],
    questionnaire_type: &'static str,
) -> Result<UacQidPair, UacQidSelectionError> {
    links
        .iter()
        .rev()
        .find(|link| link.qid.starts_with(questionnaire_type))
        .map(|link| UacQidPair {
            uac: link.uac.clone(),
            qid: link.qid.clone(),
        })
        .ok_or(UacQidSelectionError::Missing(questionnaire_type))
}
