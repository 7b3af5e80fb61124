use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use action_scheduler::config::QueueConfig;
use action_scheduler::store::{
    ActionRule, ActionStore, InMemoryActionStore, InitialContactType, UacQidPair,
};
use action_scheduler::transport::InMemoryExchange;
use action_scheduler::workflows::fulfilment::{IssuanceError, UacQidIssuer, PRINTER_ROUTING_KEY};
use action_scheduler::Pipeline;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

const CASE_ID: &str = "5bf4a7ba-1e2c-4b7f-a0de-3c8f7f0b7a11";
const OTHER_CASE_ID: &str = "0f3e9c1d-7b2a-4c5e-8d6f-1a2b3c4d5e6f";
const ACTION_PLAN_ID: &str = "d2a7a1e0-6a3e-4b9d-9a0c-5f1e2a3b4c5d";

struct SequentialIssuer {
    next: AtomicU64,
}

impl UacQidIssuer for SequentialIssuer {
    fn issue(&self, _case_id: &Uuid, questionnaire_type: &str) -> Result<UacQidPair, IssuanceError> {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(UacQidPair {
            uac: format!("issued-uac-{n}"),
            qid: format!("{questionnaire_type}{n:014}"),
        })
    }
}

fn queue_config() -> QueueConfig {
    QueueConfig {
        consumers: 2,
        prefetch: 16,
        max_redeliveries: 1,
        redelivery_delay: Duration::from_millis(20),
        ..QueueConfig::default()
    }
}

fn case_created() -> Value {
    case_created_for(CASE_ID, "1000000001")
}

fn case_created_for(case_id: &str, case_ref: &str) -> Value {
    json!({
        "event": { "type": "CASE_CREATED", "source": "CASE_SERVICE", "channel": "RM" },
        "payload": {
            "collectionCase": {
                "id": case_id,
                "caseRef": case_ref,
                "survey": "CENSUS",
                "collectionExerciseId": "n66de4dc-3c3b-11e9-b210-d663bd873d93",
                "actionableFrom": "2011-08-12T20:17:46.384Z",
                "state": "ACTIONABLE",
                "address": {
                    "addressLine1": "123 Fake Street",
                    "addressLine2": "Fakeville",
                    "addressLine3": "",
                    "townName": "Faketown",
                    "postcode": "FA1 2KE",
                    "arid": "XXXXX",
                    "latitude": "41.40338",
                    "longitude": "2.17403",
                    "uprn": "XXXXXXXXXXXXX",
                    "region": "E"
                },
                "actionPlanId": ACTION_PLAN_ID,
                "treatmentCode": "HH_LF2R1E",
                "oa": "E00000001",
                "lsoa": "E01000001",
                "msoa": "E02000001",
                "lad": "E06000001",
                "htcWillingness": "1",
                "htcDigital": "2"
            }
        }
    })
}

fn uac_updated(case_id: &str, uac: &str, qid: &str) -> Value {
    json!({
        "event": { "type": "UAC_UPDATED", "source": "CASE_SERVICE", "channel": "RM" },
        "payload": {
            "uac": { "uac": uac, "questionnaireId": qid, "caseId": case_id }
        }
    })
}

fn response_received(qid: &str) -> Value {
    json!({
        "event": { "type": "RESPONSE_RECEIVED", "source": "RECEIPT_SERVICE", "channel": "EQ" },
        "payload": { "response": { "questionnaireId": qid } }
    })
}

fn fulfilment(code: &str, contact: Option<Value>) -> Value {
    let mut request = json!({ "caseId": CASE_ID, "fulfilmentCode": code });
    if let Some(contact) = contact {
        request["contact"] = contact;
    }
    json!({
        "event": { "type": "FULFILMENT_REQUESTED", "channel": "CC" },
        "payload": { "fulfilmentRequest": request }
    })
}

fn bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).expect("serializable")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn events_and_fulfilments_flow_through_to_print_instructions() {
    let store = Arc::new(InMemoryActionStore::new());
    let exchange = Arc::new(InMemoryExchange::new());
    let issuer = Arc::new(SequentialIssuer {
        next: AtomicU64::new(1),
    });
    let pipeline = Pipeline::new(queue_config(), store.clone(), issuer, exchange.clone())
        .start(Duration::from_secs(3600));

    pipeline
        .case_queue()
        .publish(bytes(&case_created()))
        .expect("case event accepted");
    pipeline.drain().await;

    let case = store
        .find_case_by_ref(1000000001)
        .expect("read")
        .expect("case ingested");
    assert_eq!(case.address.postcode, "FA1 2KE");

    for request in [
        fulfilment("P_OR_H1", None),
        fulfilment(
            "P_OR_I1",
            Some(json!({ "title": "Mr", "forename": "J", "surname": "Smith" })),
        ),
        fulfilment("UACHHT1", None),
        fulfilment("P_XX_NOPE", None),
    ] {
        pipeline
            .fulfilment_queue()
            .publish(bytes(&request))
            .expect("fulfilment accepted");
    }
    pipeline.drain().await;
    assert!(pipeline.fulfilment_queue().dead_letters().is_empty());

    let report = pipeline.trigger_now().await.expect("tick ran");
    assert!(report.errors.is_empty());
    assert_eq!(report.dispatched, 2);

    let messages = exchange.messages();
    assert!(messages
        .iter()
        .all(|message| message.routing_key == PRINTER_ROUTING_KEY));

    let household = messages
        .iter()
        .map(|message| &message.body)
        .find(|body| body["packCode"] == "P_OR_H1")
        .expect("household instruction");
    assert_eq!(household["caseRef"], 1000000001_i64);
    assert_eq!(household["actionType"], "P_OR_HX");
    assert!(household.get("iac").is_none());

    let individual = messages
        .iter()
        .map(|message| &message.body)
        .find(|body| body["packCode"] == "P_OR_I1")
        .expect("individual instruction");
    assert_eq!(individual["surname"], "Smith");
    assert!(individual["qid"]
        .as_str()
        .expect("qid issued")
        .starts_with("21"));
    assert_eq!(individual["batchId"], household["batchId"]);

    pipeline.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fulfilment_for_unknown_case_is_dead_lettered() {
    let store = Arc::new(InMemoryActionStore::new());
    let exchange = Arc::new(InMemoryExchange::new());
    let issuer = Arc::new(SequentialIssuer {
        next: AtomicU64::new(1),
    });
    let pipeline = Pipeline::new(queue_config(), store, issuer, exchange.clone())
        .start(Duration::from_secs(3600));

    pipeline
        .fulfilment_queue()
        .publish(bytes(&fulfilment("P_OR_H1", None)))
        .expect("fulfilment accepted");
    pipeline
        .case_queue()
        .publish(b"not json".to_vec())
        .expect("event accepted");
    pipeline.drain().await;

    let dead = pipeline.fulfilment_queue().dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 2);
    assert!(dead[0].reason.contains(CASE_ID));
    assert_eq!(pipeline.case_queue().dead_letters().len(), 1);

    let report = pipeline.trigger_now().await.expect("tick ran");
    assert_eq!(report.dispatched, 0);
    assert!(exchange.messages().is_empty());

    pipeline.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fulfilment_published_before_its_case_still_prints() {
    let store = Arc::new(InMemoryActionStore::new());
    let exchange = Arc::new(InMemoryExchange::new());
    let issuer = Arc::new(SequentialIssuer {
        next: AtomicU64::new(1),
    });
    let config = QueueConfig {
        max_redeliveries: 5,
        ..queue_config()
    };
    let pipeline = Pipeline::new(config, store, issuer, exchange.clone())
        .start(Duration::from_secs(3600));

    pipeline
        .fulfilment_queue()
        .publish(bytes(&fulfilment("P_OR_H1", None)))
        .expect("fulfilment accepted");
    pipeline
        .case_queue()
        .publish(bytes(&case_created()))
        .expect("case event accepted");
    pipeline.drain().await;

    assert!(pipeline.fulfilment_queue().dead_letters().is_empty());
    let report = pipeline.trigger_now().await.expect("tick ran");
    assert_eq!(report.dispatched, 1);
    let messages = exchange.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].body["packCode"], "P_OR_H1");
    assert_eq!(messages[0].body["caseRef"], 1000000001_i64);

    pipeline.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn action_rule_prints_stored_links_and_skips_receipted_cases() {
    let store = Arc::new(InMemoryActionStore::new());
    let exchange = Arc::new(InMemoryExchange::new());
    let issuer = Arc::new(SequentialIssuer {
        next: AtomicU64::new(1),
    });
    let pipeline = Pipeline::new(queue_config(), store.clone(), issuer, exchange.clone())
        .start(Duration::from_secs(3600));

    for event in [
        case_created_for(CASE_ID, "1000000001"),
        case_created_for(OTHER_CASE_ID, "1000000002"),
    ] {
        pipeline
            .case_queue()
            .publish(bytes(&event))
            .expect("case event accepted");
    }
    pipeline.drain().await;
    for event in [
        uac_updated(CASE_ID, "initial-uac-1", "0100000000000001"),
        uac_updated(OTHER_CASE_ID, "initial-uac-2", "0100000000000002"),
    ] {
        pipeline
            .case_queue()
            .publish(bytes(&event))
            .expect("uac event accepted");
    }
    pipeline.drain().await;
    pipeline
        .case_queue()
        .publish(bytes(&response_received("0100000000000002")))
        .expect("receipt accepted");
    pipeline.drain().await;
    assert!(pipeline.case_queue().dead_letters().is_empty());

    let receipted = store
        .find_case_by_ref(1000000002)
        .expect("read")
        .expect("case ingested");
    assert!(receipted.receipt_received);

    let rule = ActionRule {
        id: Uuid::new_v4(),
        action_plan_id: ACTION_PLAN_ID.to_string(),
        action_type: InitialContactType::HouseholdQuestionnaireEngland,
        trigger_at: Utc::now(),
        has_triggered: false,
        treatment_codes: Vec::new(),
    };
    store
        .transaction(|tx| tx.save_action_rule(rule.clone()))
        .expect("rule saved");

    let report = pipeline.trigger_now().await.expect("tick ran");
    assert!(report.errors.is_empty());
    assert_eq!(report.rule_runs.len(), 1);
    assert_eq!(report.rule_runs[0].dispatched, 1);

    let messages = exchange.messages();
    assert_eq!(messages.len(), 1);
    let body = &messages[0].body;
    assert_eq!(body["packCode"], "P_IC_H1");
    assert_eq!(body["actionType"], "ICHHQE");
    assert_eq!(body["caseRef"], 1000000001_i64);
    assert_eq!(body["iac"], "initial-uac-1");
    assert_eq!(body["qid"], "0100000000000001");

    let report = pipeline.trigger_now().await.expect("tick ran");
    assert!(report.rule_runs.is_empty());
    assert_eq!(exchange.messages().len(), 1);

    pipeline.shutdown().await;
}
