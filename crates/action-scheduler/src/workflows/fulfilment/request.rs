use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::Contact;
use crate::wire::null_as_default;

pub const FULFILMENT_REQUESTED: &str = "FULFILMENT_REQUESTED";

/// Request to print and post a product to a case or a named individual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfilmentRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fulfilment_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_coordinator_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_officer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organisation_name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RequestDecodeError {
    #[error("fulfilment payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported event type '{0}' on fulfilment queue")]
    UnsupportedEventType(String),
    #[error("fulfilment event is missing payload.fulfilmentRequest")]
    MissingRequest,
}

impl FulfilmentRequest {
    pub fn household(case_id: impl Into<String>, fulfilment_code: impl Into<String>) -> Self {
        Self {
            case_id: Some(case_id.into()),
            fulfilment_code: fulfilment_code.into(),
            contact: None,
            field_coordinator_id: None,
            field_officer_id: None,
            organisation_name: None,
        }
    }

    pub fn with_contact(mut self, contact: Contact) -> Self {
        self.contact = Some(contact);
        self
    }

    /// Accepts either a `FULFILMENT_REQUESTED` envelope or a bare request object.
    pub fn decode(body: &[u8]) -> Result<Self, RequestDecodeError> {
        let value: Value = serde_json::from_slice(body)?;

        let Some(event) = value.get("event") else {
            return Ok(serde_json::from_value(value)?);
        };

        let event_type = event
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if event_type != FULFILMENT_REQUESTED {
            return Err(RequestDecodeError::UnsupportedEventType(
                event_type.to_string(),
            ));
        }

        let request = value
            .get("payload")
            .and_then(|payload| payload.get("fulfilmentRequest"))
            .cloned()
            .ok_or(RequestDecodeError::MissingRequest)?;
        Ok(serde_json::from_value(request)?)
    }
}
