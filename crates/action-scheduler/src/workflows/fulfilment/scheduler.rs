use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{error, info};

use super::batch::{BatchSummary, FulfilmentBatchProcessor};
use super::dispatch::Dispatcher;
use crate::store::ActionStore;
use crate::transport::OutboundPublisher;
use crate::workflows::action_rules::{ActionRuleTrigger, RuleRun};

/// Source of scheduler ticks. Resolves to `false` once no further ticks will come.
pub trait Ticker: Send {
    fn tick(&mut self) -> impl Future<Output = bool> + Send;
}

/// Fixed-cadence ticker that stops when the shutdown flag flips to `true`.
pub struct IntervalTicker {
    interval: Interval,
    shutdown: watch::Receiver<bool>,
}

impl IntervalTicker {
    /// The first tick fires one full period after construction.
    pub fn new(period: Duration, shutdown: watch::Receiver<bool>) -> Self {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, shutdown }
    }
}

impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        if *self.shutdown.borrow() {
            return false;
        }

        tokio::select! {
            _ = self.interval.tick() => true,
            changed = self.shutdown.changed() => match changed {
                Ok(()) => !*self.shutdown.borrow(),
                Err(_) => false,
            },
        }
    }
}

/// What one trigger accomplished. Errors are recorded, never raised.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub rule_runs: Vec<RuleRun>,
    pub batch: Option<BatchSummary>,
    pub dispatched: usize,
    pub errors: Vec<String>,
}

/// Action rules, then batch-then-dispatch, run once per tick.
pub struct FulfilmentScheduler<S, P> {
    action_rules: ActionRuleTrigger<S, P>,
    batches: FulfilmentBatchProcessor<S>,
    dispatcher: Dispatcher<S, P>,
}

impl<S, P> FulfilmentScheduler<S, P>
where
    S: ActionStore + 'static,
    P: OutboundPublisher + 'static,
{
    pub fn new(store: Arc<S>, publisher: Arc<P>, exchange: impl Into<String>) -> Self {
        let exchange = exchange.into();
        Self {
            action_rules: ActionRuleTrigger::new(
                store.clone(),
                publisher.clone(),
                exchange.clone(),
            ),
            batches: FulfilmentBatchProcessor::new(store.clone()),
            dispatcher: Dispatcher::new(store, publisher, exchange),
        }
    }

    /// Assigns a batch to new jobs, then dispatches everything batched so far.
    ///
    /// Dispatch runs even when batching fails so that jobs batched on an
    /// earlier tick are not held back. Failed work is retried on the next tick.
    pub fn trigger_fulfilments(&self) -> TickReport {
        let mut report = TickReport::default();

        match self.batches.assign_batch() {
            Ok(batch) => report.batch = batch,
            Err(err) => {
                error!(error = %err, "unexpected error while batching fulfilments");
                report.errors.push(err.to_string());
            }
        }

        match self.dispatcher.dispatch() {
            Ok(instructions) => report.dispatched = instructions.len(),
            Err(err) => {
                error!(
                    exchange = self.dispatcher.exchange(),
                    error = %err,
                    "unexpected error while dispatching print instructions"
                );
                report.errors.push(err.to_string());
            }
        }

        report
    }

    /// Triggers the action rules due at `now`, then the fulfilment pass.
    pub fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut rule_runs = Vec::new();
        let mut errors = Vec::new();

        match self.action_rules.due_rules(now) {
            Ok(rules) => {
                for rule in &rules {
                    match self.action_rules.trigger(rule) {
                        Ok(run) => rule_runs.push(run),
                        Err(err) => {
                            error!(rule_id = %rule.id, error = %err, "action rule failed");
                            errors.push(err.to_string());
                        }
                    }
                }
            }
            Err(err) => {
                error!(error = %err, "unexpected error while loading action rules");
                errors.push(err.to_string());
            }
        }

        let mut report = self.trigger_fulfilments();
        report.rule_runs = rule_runs;
        errors.append(&mut report.errors);
        report.errors = errors;
        report
    }

    /// Runs one trigger per tick until the ticker stops. Ticks never overlap.
    pub async fn run<T>(self: Arc<Self>, mut ticker: T)
    where
        T: Ticker,
    {
        info!("fulfilment scheduler started");

        while ticker.tick().await {
            let scheduler = self.clone();
            match tokio::task::spawn_blocking(move || scheduler.tick(Utc::now())).await {
                Ok(report) if !report.errors.is_empty() => {
                    info!(failures = report.errors.len(), "fulfilment tick will retry");
                }
                Ok(_) => {}
                Err(join_error) => {
                    error!(error = %join_error, "fulfilment tick aborted");
                }
            }
        }

        info!("fulfilment scheduler stopped");
    }
}
