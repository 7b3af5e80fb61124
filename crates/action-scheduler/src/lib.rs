//! Census action scheduler.
//!
//! Ingests case and UAC/QID events, turns fulfilment requests into queued
//! print jobs, and on each scheduler tick batches those jobs and dispatches
//! print instructions to the outbound exchange.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;
pub mod telemetry;
pub mod transport;
pub mod workflows;

mod wire;

pub use pipeline::{Pipeline, PipelineHandle};
