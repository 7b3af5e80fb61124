use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::uac_qids::{select_uac_qids, CaseUacQids};
use crate::store::{ActionRule, ActionStore, Case, InitialContactType, StoreError};
use crate::transport::{OutboundPublisher, PublishError};
use crate::workflows::fulfilment::{PrintInstruction, PRINTER_ROUTING_KEY};

/// Result of one triggered rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRun {
    pub rule_id: Uuid,
    pub action_type: InitialContactType,
    pub batch_id: Uuid,
    pub dispatched: usize,
    pub skipped: Vec<SkippedCase>,
}

/// Selected case left out of the run because its packs cannot be printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedCase {
    pub case_ref: i64,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ActionRuleError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("print instruction could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Runs due action rules against the store and publishes their print instructions.
pub struct ActionRuleTrigger<S, P> {
    store: Arc<S>,
    publisher: Arc<P>,
    exchange: String,
}

impl<S, P> ActionRuleTrigger<S, P>
where
    S: ActionStore + 'static,
    P: OutboundPublisher + 'static,
{
    pub fn new(store: Arc<S>, publisher: Arc<P>, exchange: impl Into<String>) -> Self {
        Self {
            store,
            publisher,
            exchange: exchange.into(),
        }
    }

    pub fn due_rules(&self, now: DateTime<Utc>) -> Result<Vec<ActionRule>, ActionRuleError> {
        let rules = self.store.transaction(|tx| tx.action_rules())?;
        Ok(rules.into_iter().filter(|rule| rule.is_due(now)).collect())
    }

    /// Prints every case the rule selects and marks it triggered.
    ///
    /// The publish and the triggered flag commit together: a failed publish
    /// leaves the rule due for the next tick.
    pub fn trigger(&self, rule: &ActionRule) -> Result<RuleRun, ActionRuleError> {
        let result = self.store.transaction(|tx| {
            let cases = tx.unreceipted_cases_for_plan(&rule.action_plan_id)?;

            let mut printable = Vec::new();
            let mut skipped = Vec::new();
            for case in cases.into_iter().filter(|case| rule.selects(case)) {
                let links = tx.uac_qid_links_for_case(&case.case_id)?;
                match select_uac_qids(rule.action_type, &links) {
                    Ok(codes) => printable.push((case, codes)),
                    Err(err) => {
                        warn!(
                            rule_id = %rule.id,
                            case_ref = case.case_ref,
                            error = %err,
                            "case left out of initial contact"
                        );
                        skipped.push(SkippedCase {
                            case_ref: case.case_ref,
                            reason: err.to_string(),
                        });
                    }
                }
            }

            tx.mark_rule_triggered(rule.id)?;

            let batch_id = Uuid::new_v4();
            let quantity = u32::try_from(printable.len()).unwrap_or(u32::MAX);
            let payloads = printable
                .iter()
                .map(|(case, codes)| {
                    serde_json::to_vec(&initial_contact(rule, case, codes, batch_id, quantity))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let dispatched = payloads.len();
            if dispatched > 0 {
                self.publisher
                    .publish_all(&self.exchange, PRINTER_ROUTING_KEY, payloads)?;
            }

            Ok::<_, ActionRuleError>(RuleRun {
                rule_id: rule.id,
                action_type: rule.action_type,
                batch_id,
                dispatched,
                skipped,
            })
        });

        match &result {
            Ok(run) => info!(
                rule_id = %run.rule_id,
                action_type = %run.action_type,
                batch_id = %run.batch_id,
                dispatched = run.dispatched,
                skipped = run.skipped.len(),
                "action rule triggered"
            ),
            Err(err) => warn!(rule_id = %rule.id, error = %err, "action rule rolled back"),
        }

        result
    }
}

fn initial_contact(
    rule: &ActionRule,
    case: &Case,
    codes: &CaseUacQids,
    batch_id: Uuid,
    batch_quantity: u32,
) -> PrintInstruction {
    let address = &case.address;
    PrintInstruction {
        address_line1: address.address_line1.clone(),
        address_line2: address.address_line2.clone(),
        address_line3: address.address_line3.clone(),
        town_name: address.town_name.clone(),
        postcode: address.postcode.clone(),
        title: String::new(),
        forename: String::new(),
        surname: String::new(),
        batch_id,
        batch_quantity,
        pack_code: rule.action_type.pack_code().to_string(),
        action_type: rule.action_type.name().to_string(),
        case_ref: case.case_ref,
        iac: Some(codes.primary.uac.clone()),
        qid: Some(codes.primary.qid.clone()),
        iac_wales: codes.welsh.as_ref().map(|pair| pair.uac.clone()),
        qid_wales: codes.welsh.as_ref().map(|pair| pair.qid.clone()),
        field_coordinator_id: None,
        field_officer_id: None,
        organisation_name: None,
    }
}
