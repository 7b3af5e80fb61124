//! Case, UAC/QID link, and print-queue persistence.

pub mod domain;
pub mod memory;
pub mod repository;

pub use domain::{
    ActionRule, ActionType, Address, Case, CaseState, Contact, InitialContactType, JobId,
    PrintJob, QueuedPrintJob, UacQidLink, UacQidPair, UnknownCaseState,
};
pub use memory::InMemoryActionStore;
pub use repository::{ActionStore, StoreError, StoreTransaction};
