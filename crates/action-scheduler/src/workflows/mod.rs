pub mod action_rules;
pub mod fulfilment;
pub mod ingestion;
pub mod router;

pub use router::{action_router, ActionRouterState};
