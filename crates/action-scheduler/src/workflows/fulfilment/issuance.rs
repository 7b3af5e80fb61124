use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::CaseApiConfig;
use crate::store::UacQidPair;

/// Source of new UAC/QID pairs for a case.
pub trait UacQidIssuer: Send + Sync {
    fn issue(&self, case_id: &Uuid, questionnaire_type: &str)
        -> Result<UacQidPair, IssuanceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum IssuanceError {
    #[error("uac/qid issuance timed out")]
    Timeout,
    #[error("uac/qid service returned status {0}")]
    Status(u16),
    #[error("uac/qid service unreachable: {0}")]
    Transport(String),
    #[error("uac/qid service response unreadable: {0}")]
    InvalidResponse(String),
}

impl From<ureq::Error> for IssuanceError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Timeout(_) => IssuanceError::Timeout,
            ureq::Error::StatusCode(status) => IssuanceError::Status(status),
            other => IssuanceError::Transport(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateUacQidRequest<'a> {
    case_id: String,
    questionnaire_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct UacQidResponse {
    uac: String,
    qid: String,
}

/// Issues pairs through the case service's `POST /uacqid/create/` endpoint.
///
/// Every call is bounded by the configured timeout so a stalled case service
/// cannot hold a consumer worker indefinitely.
pub struct CaseApiIssuer {
    agent: ureq::Agent,
    create_url: String,
}

impl CaseApiIssuer {
    pub fn new(config: &CaseApiConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .build();

        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            create_url: format!("{}/uacqid/create/", config.base_url.trim_end_matches('/')),
        }
    }
}

impl UacQidIssuer for CaseApiIssuer {
    fn issue(
        &self,
        case_id: &Uuid,
        questionnaire_type: &str,
    ) -> Result<UacQidPair, IssuanceError> {
        debug!(%case_id, questionnaire_type, "requesting new uac/qid pair");

        let response = self.agent.post(&self.create_url).send_json(&CreateUacQidRequest {
            case_id: case_id.to_string(),
            questionnaire_type,
        })?;

        let body: UacQidResponse = response
            .into_body()
            .read_json()
            .map_err(|err| IssuanceError::InvalidResponse(err.to_string()))?;

        Ok(UacQidPair {
            uac: body.uac,
            qid: body.qid,
        })
    }
}
