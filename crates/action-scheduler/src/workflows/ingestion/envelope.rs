use std::num::ParseIntError;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{Address, Case, CaseState, UnknownCaseState};
use crate::wire::null_as_default;

pub const CASE_CREATED: &str = "CASE_CREATED";
pub const UAC_UPDATED: &str = "UAC_UPDATED";
pub const RESPONSE_RECEIVED: &str = "RESPONSE_RECEIVED";

/// Response management event as published on the case queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseManagementEvent {
    pub event: EventHeader,
    #[serde(default)]
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHeader {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_case: Option<CollectionCaseSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uac: Option<UacSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseSnapshot>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectionCaseSnapshot {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub case_ref: String,
    #[serde(deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(deserialize_with = "null_as_default")]
    pub address: AddressSnapshot,
    #[serde(deserialize_with = "null_as_default")]
    pub action_plan_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub treatment_code: String,
    #[serde(deserialize_with = "null_as_default")]
    pub oa: String,
    #[serde(deserialize_with = "null_as_default")]
    pub lsoa: String,
    #[serde(deserialize_with = "null_as_default")]
    pub msoa: String,
    #[serde(deserialize_with = "null_as_default")]
    pub lad: String,
    #[serde(deserialize_with = "null_as_default")]
    pub htc_willingness: String,
    #[serde(deserialize_with = "null_as_default")]
    pub htc_digital: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub survey: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_exercise_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actionable_from: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddressSnapshot {
    #[serde(deserialize_with = "null_as_default")]
    pub address_line1: String,
    #[serde(deserialize_with = "null_as_default")]
    pub address_line2: String,
    #[serde(deserialize_with = "null_as_default")]
    pub address_line3: String,
    #[serde(deserialize_with = "null_as_default")]
    pub town_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub postcode: String,
    #[serde(deserialize_with = "null_as_default")]
    pub arid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub latitude: String,
    #[serde(deserialize_with = "null_as_default")]
    pub longitude: String,
    #[serde(deserialize_with = "null_as_default")]
    pub uprn: String,
    #[serde(deserialize_with = "null_as_default")]
    pub region: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UacSnapshot {
    #[serde(deserialize_with = "null_as_default")]
    pub questionnaire_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub uac: String,
    #[serde(deserialize_with = "null_as_default")]
    pub case_id: String,
}

/// Completed questionnaire reported by the receipting service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponseSnapshot {
    #[serde(deserialize_with = "null_as_default")]
    pub questionnaire_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
}

/// Decoded inbound event. Adding a variant forces every consumer to handle it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    CaseCreated(Case),
    UacUpdated(UacUpdate),
    ResponseReceived(ResponseReceipt),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseReceipt {
    pub qid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UacUpdate {
    pub uac: String,
    pub qid: String,
    pub case_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("event payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported event type '{0}'")]
    UnsupportedEventType(String),
    #[error("{event_type} event is missing payload.{section}")]
    MissingPayload {
        event_type: &'static str,
        section: &'static str,
    },
    #[error("caseRef '{value}' is not numeric")]
    InvalidCaseRef {
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("{field} '{value}' is not a UUID")]
    InvalidUuid {
        field: &'static str,
        value: String,
        #[source]
        source: uuid::Error,
    },
    #[error(transparent)]
    InvalidState(#[from] UnknownCaseState),
    #[error("{event_type} event has no {field}")]
    MissingField {
        event_type: &'static str,
        field: &'static str,
    },
}

impl InboundEvent {
    pub fn decode(body: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: ResponseManagementEvent = serde_json::from_slice(body)?;
        Self::try_from(envelope)
    }
}

impl TryFrom<ResponseManagementEvent> for InboundEvent {
    type Error = EnvelopeError;

    fn try_from(envelope: ResponseManagementEvent) -> Result<Self, Self::Error> {
        let ResponseManagementEvent { event, payload } = envelope;
        match event.event_type.as_str() {
            CASE_CREATED => {
                let snapshot = payload.collection_case.ok_or(EnvelopeError::MissingPayload {
                    event_type: CASE_CREATED,
                    section: "collectionCase",
                })?;
                Ok(InboundEvent::CaseCreated(Case::try_from(snapshot)?))
            }
            UAC_UPDATED => {
                let snapshot = payload.uac.ok_or(EnvelopeError::MissingPayload {
                    event_type: UAC_UPDATED,
                    section: "uac",
                })?;
                Ok(InboundEvent::UacUpdated(UacUpdate::try_from(snapshot)?))
            }
            RESPONSE_RECEIVED => {
                let snapshot = payload.response.ok_or(EnvelopeError::MissingPayload {
                    event_type: RESPONSE_RECEIVED,
                    section: "response",
                })?;
                let qid = snapshot.questionnaire_id.trim();
                if qid.is_empty() {
                    return Err(EnvelopeError::MissingField {
                        event_type: RESPONSE_RECEIVED,
                        field: "questionnaireId",
                    });
                }
                Ok(InboundEvent::ResponseReceived(ResponseReceipt {
                    qid: qid.to_string(),
                }))
            }
            other => Err(EnvelopeError::UnsupportedEventType(other.to_string())),
        }
    }
}

impl TryFrom<CollectionCaseSnapshot> for Case {
    type Error = EnvelopeError;

    fn try_from(snapshot: CollectionCaseSnapshot) -> Result<Self, Self::Error> {
        let case_ref = snapshot
            .case_ref
            .trim()
            .parse::<i64>()
            .map_err(|source| EnvelopeError::InvalidCaseRef {
                value: snapshot.case_ref.clone(),
                source,
            })?;
        let case_id = parse_uuid("id", &snapshot.id)?;
        let state = snapshot.state.parse::<CaseState>()?;
        let address = snapshot.address;

        Ok(Case {
            case_id,
            case_ref,
            state,
            address: Address {
                address_line1: address.address_line1,
                address_line2: address.address_line2,
                address_line3: address.address_line3,
                town_name: address.town_name,
                postcode: address.postcode,
                arid: address.arid,
                latitude: address.latitude,
                longitude: address.longitude,
                uprn: address.uprn,
                region: address.region,
            },
            action_plan_id: snapshot.action_plan_id,
            treatment_code: snapshot.treatment_code,
            oa: snapshot.oa,
            lsoa: snapshot.lsoa,
            msoa: snapshot.msoa,
            lad: snapshot.lad,
            htc_willingness: snapshot.htc_willingness,
            htc_digital: snapshot.htc_digital,
            receipt_received: false,
        })
    }
}

impl TryFrom<UacSnapshot> for UacUpdate {
    type Error = EnvelopeError;

    fn try_from(snapshot: UacSnapshot) -> Result<Self, Self::Error> {
        Ok(UacUpdate {
            case_id: parse_uuid("caseId", &snapshot.case_id)?,
            uac: snapshot.uac,
            qid: snapshot.questionnaire_id,
        })
    }
}

fn parse_uuid(field: &'static str, value: &str) -> Result<Uuid, EnvelopeError> {
    Uuid::parse_str(value.trim()).map_err(|source| EnvelopeError::InvalidUuid {
        field,
        value: value.to_string(),
        source,
    })
}
