//! Case-created, UAC-updated, and response-received event ingestion.

pub mod envelope;
pub mod ingestor;

pub use envelope::{
    AddressSnapshot, CollectionCaseSnapshot, EnvelopeError, EventHeader, EventPayload,
    InboundEvent, ResponseManagementEvent, ResponseReceipt, ResponseSnapshot, UacSnapshot,
    UacUpdate, CASE_CREATED, RESPONSE_RECEIVED, UAC_UPDATED,
};
pub use ingestor::{EventIngestor, IngestError, IngestOutcome};
