use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use crate::store::{
    ActionRule, ActionStore, Address, Case, CaseState, Contact, InMemoryActionStore,
    InitialContactType, StoreError, StoreTransaction, UacQidPair,
};
use crate::transport::{InMemoryExchange, OutboundPublisher, PublishError};
use crate::workflows::fulfilment::{
    FulfilmentRequest, FulfilmentRequestService, FulfilmentScheduler, IssuanceError, Ticker,
    UacQidIssuer,
};

pub(super) const EXCHANGE: &str = "action-outbound-exchange";

pub(super) fn case(case_ref: i64) -> Case {
    Case {
        case_id: Uuid::new_v4(),
        case_ref,
        state: CaseState::Actionable,
        address: Address {
            address_line1: "1 Ty Newydd".to_string(),
            address_line2: "Heol Fawr".to_string(),
            address_line3: "Treganna".to_string(),
            town_name: "Cardiff".to_string(),
            postcode: "CF11 9AA".to_string(),
            arid: "XXXXX".to_string(),
            latitude: "51.4788".to_string(),
            longitude: "-3.2010".to_string(),
            uprn: "100012345678".to_string(),
            region: "W".to_string(),
        },
        action_plan_id: "a5d2c3a2-7d2e-4bfa-9c57-f2bb1bb5f0f3".to_string(),
        treatment_code: "HH_LF2R3BW".to_string(),
        oa: "W00000001".to_string(),
        lsoa: "W01000001".to_string(),
        msoa: "W02000001".to_string(),
        lad: "W06000015".to_string(),
        htc_willingness: "3".to_string(),
        htc_digital: "4".to_string(),
        receipt_received: false,
    }
}

pub(super) fn seeded_store(cases: &[Case]) -> Arc<InMemoryActionStore> {
    let store = Arc::new(InMemoryActionStore::new());
    store
        .transaction(|tx| {
            for case in cases {
                tx.save_case(case.clone())?;
            }
            Ok::<_, StoreError>(())
        })
        .expect("seed cases");
    store
}

pub(super) fn link(store: &InMemoryActionStore, case: &Case, uac: &str, qid: &str) {
    let pair = UacQidPair {
        uac: uac.to_string(),
        qid: qid.to_string(),
    };
    store
        .transaction(|tx| tx.insert_uac_qid_link(pair.link_to(case.case_id)))
        .expect("link case");
}

pub(super) fn initial_contact_rule(case: &Case, action_type: InitialContactType) -> ActionRule {
    ActionRule {
        id: Uuid::new_v4(),
        action_plan_id: case.action_plan_id.clone(),
        action_type,
        trigger_at: Utc::now(),
        has_triggered: false,
        treatment_codes: Vec::new(),
    }
}

pub(super) fn request(case: &Case, fulfilment_code: &str) -> FulfilmentRequest {
    FulfilmentRequest::household(case.case_id.to_string(), fulfilment_code)
}

pub(super) fn mr_j_smith() -> Contact {
    Contact {
        title: "Mr".to_string(),
        forename: "J".to_string(),
        surname: "Smith".to_string(),
    }
}

pub(super) fn build_service(
    store: Arc<InMemoryActionStore>,
) -> (
    FulfilmentRequestService<InMemoryActionStore, StubIssuer>,
    Arc<StubIssuer>,
) {
    let issuer = Arc::new(StubIssuer::default());
    (FulfilmentRequestService::new(store, issuer.clone()), issuer)
}

pub(super) fn build_scheduler(
    store: Arc<InMemoryActionStore>,
) -> (
    FulfilmentScheduler<InMemoryActionStore, InMemoryExchange>,
    Arc<InMemoryExchange>,
) {
    let exchange = Arc::new(InMemoryExchange::new());
    (
        FulfilmentScheduler::new(store, exchange.clone(), EXCHANGE),
        exchange,
    )
}

pub(super) fn queued_jobs(store: &InMemoryActionStore) -> Vec<crate::store::QueuedPrintJob> {
    store
        .transaction(|tx| tx.queued_print_jobs())
        .expect("scan queue")
}

/// Issues sequential pairs whose QID starts with the questionnaire type.
#[derive(Default)]
pub(super) struct StubIssuer {
    sequence: AtomicU64,
    calls: Mutex<Vec<(Uuid, String)>>,
}

impl StubIssuer {
    pub(super) fn calls(&self) -> Vec<(Uuid, String)> {
        self.calls.lock().expect("issuer mutex poisoned").clone()
    }
}

impl UacQidIssuer for StubIssuer {
    fn issue(
        &self,
        case_id: &Uuid,
        questionnaire_type: &str,
    ) -> Result<UacQidPair, IssuanceError> {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls
            .lock()
            .expect("issuer mutex poisoned")
            .push((*case_id, questionnaire_type.to_string()));
        Ok(UacQidPair {
            uac: format!("uac-{n:04}"),
            qid: format!("{questionnaire_type}{n:014}"),
        })
    }
}

pub(super) struct TimingOutIssuer;

impl UacQidIssuer for TimingOutIssuer {
    fn issue(&self, _: &Uuid, _: &str) -> Result<UacQidPair, IssuanceError> {
        Err(IssuanceError::Timeout)
    }
}

/// Succeeds for the primary questionnaire type and fails on every other.
pub(super) struct PrimaryOnlyIssuer;

impl UacQidIssuer for PrimaryOnlyIssuer {
    fn issue(&self, _: &Uuid, questionnaire_type: &str) -> Result<UacQidPair, IssuanceError> {
        match questionnaire_type {
            "22" => Ok(UacQidPair {
                uac: "uac-primary".to_string(),
                qid: "2200000000000001".to_string(),
            }),
            _ => Err(IssuanceError::Status(503)),
        }
    }
}

pub(super) struct DownExchange;

impl OutboundPublisher for DownExchange {
    fn publish_all(&self, exchange: &str, _: &str, _: Vec<Vec<u8>>) -> Result<(), PublishError> {
        Err(PublishError::Unavailable(exchange.to_string()))
    }
}

/// Store whose every transaction fails before running.
pub(super) struct UnavailableStore;

impl ActionStore for UnavailableStore {
    fn transaction<T, E, F>(&self, _work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        Err(StoreError::Unavailable("database offline".to_string()).into())
    }
}

/// Ticker that yields a fixed number of ticks.
pub(super) struct CountedTicker {
    pub(super) remaining: usize,
}

impl Ticker for CountedTicker {
    fn tick(&mut self) -> impl Future<Output = bool> + Send {
        let more = self.remaining > 0;
        self.remaining = self.remaining.saturating_sub(1);
        std::future::ready(more)
    }
}
