//! Fulfilment requests through to print instructions.
//!
//! A request is classified by its fulfilment code, assembled into a queued
//! print job (issuing UAC/QID pairs for individual packs), stamped with a batch
//! on the next scheduler tick, and then dispatched to the printer exchange.

mod assembler;
pub mod batch;
pub mod classifier;
pub mod dispatch;
pub mod issuance;
pub mod request;
pub mod scheduler;
pub mod service;

#[cfg(test)]
mod tests;

pub use assembler::PrintJobAssembler;
pub use batch::{BatchError, BatchSummary, FulfilmentBatchProcessor};
pub use classifier::{classify, ActionCategory, Classification, QuestionnaireType};
pub use dispatch::{DispatchError, Dispatcher, PrintInstruction, PRINTER_ROUTING_KEY};
pub use issuance::{CaseApiIssuer, IssuanceError, UacQidIssuer};
pub use request::{FulfilmentRequest, RequestDecodeError, FULFILMENT_REQUESTED};
pub use scheduler::{FulfilmentScheduler, IntervalTicker, TickReport, Ticker};
pub use service::{FulfilmentError, FulfilmentOutcome, FulfilmentRequestService};
