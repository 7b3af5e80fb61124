use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use super::common::*;
use crate::store::{ActionStore, InitialContactType};
use crate::transport::InMemoryExchange;
use crate::workflows::fulfilment::{
    FulfilmentScheduler, IntervalTicker, Ticker, PRINTER_ROUTING_KEY,
};

#[test]
fn household_request_reaches_the_printer_on_the_next_tick() {
    let household = case(1000000001);
    let store = seeded_store(&[household.clone()]);
    let (service, issuer) = build_service(store.clone());
    let (scheduler, exchange) = build_scheduler(store.clone());

    service
        .process(request(&household, "P_OR_H1"))
        .expect("queued");
    let report = scheduler.trigger_fulfilments();

    assert!(report.errors.is_empty());
    assert_eq!(report.dispatched, 1);
    assert!(issuer.calls().is_empty());

    let messages = exchange.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].routing_key, PRINTER_ROUTING_KEY);
    let body = &messages[0].body;
    assert_eq!(body["caseRef"], 1000000001_i64);
    assert_eq!(body["packCode"], "P_OR_H1");
    assert_eq!(body["actionType"], "P_OR_HX");
    assert_eq!(body["addressLine1"], "1 Ty Newydd");
    assert_eq!(body["townName"], "Cardiff");
    assert_eq!(body["postcode"], "CF11 9AA");
    assert_eq!(body["batchQuantity"], 1);
    assert_eq!(
        body["batchId"],
        report.batch.expect("batch assigned").batch_id.to_string()
    );
    assert!(body.get("iac").is_none());
}

#[test]
fn individual_request_carries_contact_and_fresh_pair() {
    let household = case(1000000301);
    let store = seeded_store(&[household.clone()]);
    let (service, issuer) = build_service(store.clone());
    let (scheduler, exchange) = build_scheduler(store.clone());

    service
        .process(request(&household, "P_OR_I1").with_contact(mr_j_smith()))
        .expect("queued");
    scheduler.trigger_fulfilments();

    assert_eq!(issuer.calls(), vec![(household.case_id, "21".to_string())]);
    let body = &exchange.messages()[0].body;
    assert_eq!(body["title"], "Mr");
    assert_eq!(body["forename"], "J");
    assert_eq!(body["surname"], "Smith");
    assert_eq!(body["actionType"], "P_OR_IX");
    assert_eq!(body["iac"], "uac-0001");
    assert!(body["qid"].as_str().expect("qid").starts_with("21"));
    assert!(body.get("qidWales").is_none());
}

#[test]
fn trigger_with_nothing_queued_is_quiet() {
    let store = seeded_store(&[]);
    let (scheduler, exchange) = build_scheduler(store);

    let report = scheduler.trigger_fulfilments();
    assert_eq!(report.batch, None);
    assert_eq!(report.dispatched, 0);
    assert!(report.errors.is_empty());
    assert!(exchange.messages().is_empty());
}

#[test]
fn store_errors_are_caught_at_the_tick_boundary() {
    let scheduler = FulfilmentScheduler::new(
        Arc::new(UnavailableStore),
        Arc::new(InMemoryExchange::new()),
        EXCHANGE,
    );

    let report = scheduler.trigger_fulfilments();
    assert_eq!(report.errors.len(), 2);
    assert_eq!(report.batch, None);
}

#[test]
fn publish_failure_is_retried_on_the_following_tick() {
    let household = case(1000000302);
    let store = seeded_store(&[household.clone()]);
    let (service, _) = build_service(store.clone());
    service
        .process(request(&household, "P_OR_HC2"))
        .expect("queued");

    let failing = FulfilmentScheduler::new(store.clone(), Arc::new(DownExchange), EXCHANGE);
    let report = failing.trigger_fulfilments();
    assert!(report.batch.is_some());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(queued_jobs(&store).len(), 1);

    let (recovered, exchange) = build_scheduler(store.clone());
    let report = recovered.trigger_fulfilments();
    assert_eq!(report.batch, None, "job keeps its earlier batch");
    assert_eq!(report.dispatched, 1);
    assert_eq!(exchange.messages().len(), 1);
}

#[test]
fn tick_runs_due_action_rules_before_fulfilments() {
    let household = case(1000000304);
    let store = seeded_store(&[household.clone()]);
    link(&store, &household, "uac-initial", "0200000000000001");
    link(&store, &household, "uac-cymraeg", "0300000000000002");
    let rule = initial_contact_rule(&household, InitialContactType::LetterWales);
    store
        .transaction(|tx| tx.save_action_rule(rule.clone()))
        .expect("save rule");
    let (service, _) = build_service(store.clone());
    service
        .process(request(&household, "P_OR_H2"))
        .expect("queued");
    let (scheduler, exchange) = build_scheduler(store.clone());

    let report = scheduler.tick(Utc::now());

    assert!(report.errors.is_empty());
    assert_eq!(report.rule_runs.len(), 1);
    assert_eq!(report.rule_runs[0].rule_id, rule.id);
    assert_eq!(report.rule_runs[0].dispatched, 1);
    assert_eq!(report.dispatched, 1);

    let messages = exchange.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].body["packCode"], "P_IC_ICL2");
    assert_eq!(messages[0].body["qidWales"], "0300000000000002");
    assert_eq!(messages[1].body["packCode"], "P_OR_H2");

    let report = scheduler.tick(Utc::now());
    assert!(report.rule_runs.is_empty());
    assert_eq!(exchange.messages().len(), 2);
}

#[test]
fn rule_not_yet_due_is_left_for_a_later_tick() {
    let household = case(1000000305);
    let store = seeded_store(&[household.clone()]);
    link(&store, &household, "uac-initial", "0100000000000001");
    let mut rule = initial_contact_rule(&household, InitialContactType::LetterEngland);
    rule.trigger_at = Utc::now() + chrono::Duration::hours(2);
    store
        .transaction(|tx| tx.save_action_rule(rule.clone()))
        .expect("save rule");
    let (scheduler, exchange) = build_scheduler(store);

    assert!(scheduler.tick(Utc::now()).rule_runs.is_empty());
    assert!(exchange.messages().is_empty());

    let report = scheduler.tick(rule.trigger_at);
    assert_eq!(report.rule_runs.len(), 1);
    assert_eq!(exchange.messages()[0].body["packCode"], "P_IC_ICL1");
}

#[test]
fn unavailable_store_fails_rules_and_fulfilments_without_panicking() {
    let scheduler = FulfilmentScheduler::new(
        Arc::new(UnavailableStore),
        Arc::new(InMemoryExchange::new()),
        EXCHANGE,
    );

    let report = scheduler.tick(Utc::now());
    assert!(report.rule_runs.is_empty());
    assert_eq!(report.errors.len(), 3);
}

#[tokio::test]
async fn run_triggers_once_per_tick_until_the_ticker_stops() {
    let household = case(1000000303);
    let store = seeded_store(&[household.clone()]);
    let (service, _) = build_service(store.clone());
    let (scheduler, exchange) = build_scheduler(store.clone());
    service
        .process(request(&household, "P_OR_H1"))
        .expect("queued");

    Arc::new(scheduler)
        .run(CountedTicker { remaining: 3 })
        .await;

    assert_eq!(exchange.messages().len(), 1);
    assert!(queued_jobs(&store).is_empty());
}

#[tokio::test]
async fn interval_ticker_stops_on_shutdown() {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut ticker = IntervalTicker::new(Duration::from_millis(20), shutdown_rx);

    assert!(ticker.tick().await);
    shutdown_tx.send(true).expect("receiver alive");
    assert!(!ticker.tick().await);
}
