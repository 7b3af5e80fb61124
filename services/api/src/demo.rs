use crate::infra::SequentialUacQidIssuer;
use action_scheduler::config::QueueConfig;
use action_scheduler::error::AppError;
use action_scheduler::store::{ActionRule, ActionStore, InMemoryActionStore, InitialContactType};
use action_scheduler::transport::InMemoryExchange;
use action_scheduler::workflows::fulfilment::{PrintInstruction, PRINTER_ROUTING_KEY};
use action_scheduler::Pipeline;
use chrono::Utc;
use clap::Args;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const DEMO_ACTION_PLAN_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Fulfilment codes requested per demo case, in order.
const DEMO_CODES: &[&str] = &["P_OR_H1", "P_OR_I2W", "P_LP_HL1", "UACHHT1", "P_OR_I1"];

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Number of sample cases to ingest.
    #[arg(long, default_value_t = 3)]
    pub(crate) cases: u32,
    /// First case reference; later cases count up from it.
    #[arg(long, default_value_t = 1000000001)]
    pub(crate) first_case_ref: i64,
    /// Print each dispatched instruction as JSON instead of a table.
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let store = Arc::new(InMemoryActionStore::new());
    let exchange = Arc::new(InMemoryExchange::new());
    let issuer = Arc::new(SequentialUacQidIssuer::default());
    let queues = QueueConfig {
        consumers: 2,
        max_redeliveries: 1,
        ..QueueConfig::default()
    };
    let pipeline = Pipeline::new(queues, store, issuer.clone(), exchange.clone())
        .start(Duration::from_secs(24 * 60 * 60));

    let case_ids: Vec<(Uuid, i64)> = (0..args.cases)
        .map(|offset| (Uuid::new_v4(), args.first_case_ref + i64::from(offset)))
        .collect();

    for (case_id, case_ref) in &case_ids {
        pipeline
            .case_queue()
            .publish(to_bytes(&case_created(case_id, *case_ref))?)?;
    }
    pipeline.drain().await;
    for (case_id, case_ref) in &case_ids {
        pipeline
            .case_queue()
            .publish(to_bytes(&uac_updated(case_id, *case_ref))?)?;
    }
    pipeline.drain().await;
    println!("Ingested {} case(s) with their initial UACs", case_ids.len());

    if let Some((_, case_ref)) = case_ids.first() {
        pipeline
            .case_queue()
            .publish(to_bytes(&response_received(*case_ref))?)?;
        pipeline.drain().await;
        println!("Receipted case {case_ref}; it is left out of initial contact");
    }
    let rule = ActionRule {
        id: Uuid::new_v4(),
        action_plan_id: DEMO_ACTION_PLAN_ID.to_string(),
        action_type: InitialContactType::HouseholdQuestionnaireEngland,
        trigger_at: Utc::now(),
        has_triggered: false,
        treatment_codes: Vec::new(),
    };
    pipeline
        .store()
        .transaction(|tx| tx.save_action_rule(rule))?;

    let mut requested = 0;
    for (index, (case_id, _)) in case_ids.iter().enumerate() {
        let code = DEMO_CODES[index % DEMO_CODES.len()];
        pipeline
            .fulfilment_queue()
            .publish(to_bytes(&fulfilment_requested(case_id, code))?)?;
        requested += 1;
    }
    pipeline.drain().await;
    println!(
        "Requested {requested} fulfilment(s); issued {} UAC/QID pair(s)",
        issuer.issued()
    );

    let report = pipeline
        .trigger_now()
        .await
        .map_err(std::io::Error::from)?;
    for run in &report.rule_runs {
        println!(
            "Action rule {} ({}) printed {} case(s), skipped {}",
            run.rule_id,
            run.action_type,
            run.dispatched,
            run.skipped.len()
        );
    }
    match &report.batch {
        Some(batch) => {
            println!("Batch {} covering {} job(s)", batch.batch_id, batch.jobs);
            for (pack_code, quantity) in &batch.quantities {
                println!("  {pack_code:<12} x{quantity}");
            }
        }
        None => println!("No print jobs were queued"),
    }
    for error in &report.errors {
        println!("Tick error: {error}");
    }

    let instructions = exchange
        .messages()
        .into_iter()
        .filter(|message| message.routing_key == PRINTER_ROUTING_KEY)
        .map(|message| serde_json::from_value::<PrintInstruction>(message.body))
        .collect::<Result<Vec<_>, _>>()?;

    println!("\nDispatched {} print instruction(s)", instructions.len());
    for instruction in &instructions {
        if args.json {
            println!("{}", serde_json::to_string_pretty(instruction)?);
        } else {
            render_instruction(instruction);
        }
    }

    let dead_letters = pipeline.fulfilment_queue().dead_letters().len()
        + pipeline.case_queue().dead_letters().len();
    if dead_letters > 0 {
        println!("\n{dead_letters} deliveries were dead-lettered");
    }

    pipeline.shutdown().await;
    Ok(())
}

fn render_instruction(instruction: &PrintInstruction) {
    let recipient = [
        instruction.title.as_str(),
        instruction.forename.as_str(),
        instruction.surname.as_str(),
    ]
    .iter()
    .filter(|part| !part.is_empty())
    .copied()
    .collect::<Vec<_>>()
    .join(" ");

    println!(
        "- {} {} case {} qty {}{}",
        instruction.pack_code,
        instruction.action_type,
        instruction.case_ref,
        instruction.batch_quantity,
        if recipient.is_empty() {
            String::new()
        } else {
            format!(" for {recipient}")
        }
    );
    if let (Some(iac), Some(qid)) = (&instruction.iac, &instruction.qid) {
        println!("    iac {iac} qid {qid}");
    }
    if let (Some(iac), Some(qid)) = (&instruction.iac_wales, &instruction.qid_wales) {
        println!("    welsh iac {iac} qid {qid}");
    }
}

fn to_bytes(value: &Value) -> Result<Vec<u8>, AppError> {
    Ok(serde_json::to_vec(value)?)
}

fn case_created(case_id: &Uuid, case_ref: i64) -> Value {
    json!({
        "event": {
            "type": "CASE_CREATED",
            "source": "CASE_SERVICE",
            "channel": "RM",
            "transactionId": Uuid::new_v4()
        },
        "payload": {
            "collectionCase": {
                "id": case_id,
                "caseRef": case_ref.to_string(),
                "survey": "CENSUS",
                "state": "ACTIONABLE",
                "address": {
                    "addressLine1": format!("{} Demo Street", case_ref % 100),
                    "addressLine2": "Demoville",
                    "addressLine3": "",
                    "townName": "Newport",
                    "postcode": "NP10 8XG",
                    "arid": "DEMO-ARID",
                    "latitude": "51.5842",
                    "longitude": "-2.9977",
                    "uprn": "10023122451",
                    "region": "W"
                },
                "actionPlanId": DEMO_ACTION_PLAN_ID,
                "treatmentCode": "HH_LF2R1E",
                "oa": "W00010001",
                "lsoa": "W01001001",
                "msoa": "W02000101",
                "lad": "W06000022",
                "htcWillingness": "1",
                "htcDigital": "1"
            }
        }
    })
}

fn uac_updated(case_id: &Uuid, case_ref: i64) -> Value {
    json!({
        "event": { "type": "UAC_UPDATED", "source": "CASE_SERVICE", "channel": "RM" },
        "payload": {
            "uac": {
                "uac": format!("demo-uac-{case_ref}"),
                "questionnaireId": format!("01{case_ref:014}"),
                "caseId": case_id
            }
        }
    })
}

fn response_received(case_ref: i64) -> Value {
    json!({
        "event": { "type": "RESPONSE_RECEIVED", "source": "RECEIPT_SERVICE", "channel": "EQ" },
        "payload": {
            "response": { "questionnaireId": format!("01{case_ref:014}") }
        }
    })
}

fn fulfilment_requested(case_id: &Uuid, fulfilment_code: &str) -> Value {
    let mut request = json!({
        "caseId": case_id,
        "fulfilmentCode": fulfilment_code,
    });
    if fulfilment_code.starts_with("P_OR_I") {
        request["contact"] = json!({ "title": "Ms", "forename": "Rhian", "surname": "Evans" });
    }

    json!({
        "event": { "type": "FULFILMENT_REQUESTED", "source": "CONTACT_CENTRE_API", "channel": "CC" },
        "payload": { "fulfilmentRequest": request }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_scheduler::workflows::fulfilment::FulfilmentRequest;
    use action_scheduler::workflows::ingestion::InboundEvent;

    #[test]
    fn sample_case_event_decodes() {
        let case_id = Uuid::new_v4();
        let body = to_bytes(&case_created(&case_id, 1000000001)).expect("bytes");

        match InboundEvent::decode(&body).expect("decodes") {
            InboundEvent::CaseCreated(case) => {
                assert_eq!(case.case_id, case_id);
                assert_eq!(case.case_ref, 1000000001);
            }
            other => panic!("expected case created, got {other:?}"),
        }
    }

    #[test]
    fn sample_uac_event_links_to_the_case() {
        let case_id = Uuid::new_v4();
        let body = to_bytes(&uac_updated(&case_id, 1000000001)).expect("bytes");

        match InboundEvent::decode(&body).expect("decodes") {
            InboundEvent::UacUpdated(update) => {
                assert_eq!(update.case_id, case_id);
                assert_eq!(update.uac, "demo-uac-1000000001");
            }
            other => panic!("expected uac update, got {other:?}"),
        }
    }

    #[test]
    fn sample_receipt_names_the_initial_qid() {
        let body = to_bytes(&response_received(1000000001)).expect("bytes");

        match InboundEvent::decode(&body).expect("decodes") {
            InboundEvent::ResponseReceived(receipt) => {
                assert_eq!(receipt.qid, "0100001000000001");
            }
            other => panic!("expected response received, got {other:?}"),
        }
    }

    #[test]
    fn individual_sample_requests_carry_a_contact() {
        let body = to_bytes(&fulfilment_requested(&Uuid::new_v4(), "P_OR_I1")).expect("bytes");
        let request = FulfilmentRequest::decode(&body).expect("decodes");
        assert_eq!(request.contact.expect("contact").surname, "Evans");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn demo_runs_to_completion() {
        run_demo(DemoArgs {
            cases: 5,
            first_case_ref: 1000000001,
            json: true,
        })
        .await
        .expect("demo completes");
    }
}
