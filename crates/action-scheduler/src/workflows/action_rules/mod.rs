//! Scheduled initial-contact print runs.
//!
//! An action rule names an action plan, an initial-contact pack, and a trigger
//! time. Once due, every unreceipted case of the plan is printed with the
//! UAC/QID links it already holds and the rule is marked as triggered.

pub mod trigger;
pub mod uac_qids;

pub use trigger::{ActionRuleError, ActionRuleTrigger, RuleRun, SkippedCase};
pub use uac_qids::{select_uac_qids, CaseUacQids, UacQidSelectionError};
