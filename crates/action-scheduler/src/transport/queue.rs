use std::collections::{BTreeMap, VecDeque};
use std::pin::pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

const DEFAULT_DEAD_LETTER_LIMIT: usize = 1000;
const MAX_BACKOFF_DOUBLINGS: u32 = 10;

/// Message handed to a consumer. Must be settled with `ack` or `nack`.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub redelivery_count: u32,
    pub body: Vec<u8>,
}

/// Delivery that exhausted its redeliveries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub queue: String,
    pub delivery_tag: u64,
    pub attempts: u32,
    pub reason: String,
    pub body: String,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("queue '{queue}' is full ({capacity} ready deliveries)")]
    QueueFull { queue: String, capacity: usize },
    #[error("queue '{0}' is closed")]
    Closed(String),
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Delivery>,
    /// Nacked deliveries keyed by the instant they become ready again.
    delayed: BTreeMap<(Instant, u64), Delivery>,
    in_flight: usize,
    dead_letters: VecDeque<DeadLetter>,
    dropped_dead_letters: u64,
    next_tag: u64,
    closed: bool,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.ready.is_empty() && self.delayed.is_empty() && self.in_flight == 0
    }

    /// Moves due redeliveries to the ready queue. After close nothing waits.
    fn promote_due(&mut self, now: Instant) {
        while let Some(entry) = self.delayed.first_entry() {
            if !self.closed && entry.key().0 > now {
                break;
            }
            self.ready.push_back(entry.remove());
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.delayed.keys().next().map(|(due, _)| *due)
    }
}

/// Bounded at-least-once queue. Failed deliveries are redelivered after a
/// doubling delay until `max_redeliveries` is exceeded, then dead-lettered.
#[derive(Debug)]
pub struct InboundQueue {
    name: String,
    capacity: usize,
    max_redeliveries: u32,
    redelivery_delay: Duration,
    dead_letter_limit: usize,
    state: Mutex<QueueState>,
    available: Notify,
    idle: Notify,
}

impl InboundQueue {
    /// Redelivers immediately until [`InboundQueue::with_redelivery_delay`] says otherwise.
    pub fn new(name: impl Into<String>, capacity: usize, max_redeliveries: u32) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            max_redeliveries,
            redelivery_delay: Duration::ZERO,
            dead_letter_limit: DEFAULT_DEAD_LETTER_LIMIT,
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
            idle: Notify::new(),
        }
    }

    pub fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = delay;
        self
    }

    pub fn with_dead_letter_limit(mut self, limit: usize) -> Self {
        self.dead_letter_limit = limit.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delay before redelivery number `redelivery` (1-based).
    fn backoff(&self, redelivery: u32) -> Duration {
        let doublings = redelivery.saturating_sub(1).min(MAX_BACKOFF_DOUBLINGS);
        self.redelivery_delay.saturating_mul(1 << doublings)
    }

    /// Enqueues a message, refusing it when the queue is at capacity.
    pub fn publish(&self, body: Vec<u8>) -> Result<u64, TransportError> {
        let tag = {
            let mut state = self.lock();
            if state.closed {
                return Err(TransportError::Closed(self.name.clone()));
            }
            if state.ready.len() >= self.capacity {
                return Err(TransportError::QueueFull {
                    queue: self.name.clone(),
                    capacity: self.capacity,
                });
            }
            state.next_tag += 1;
            let tag = state.next_tag;
            state.ready.push_back(Delivery {
                delivery_tag: tag,
                redelivery_count: 0,
                body,
            });
            tag
        };

        self.available.notify_waiters();
        Ok(tag)
    }

    /// Waits for the next delivery. Returns `None` once closed and drained.
    pub async fn receive(&self) -> Option<Delivery> {
        loop {
            let mut notified = pin!(self.available.notified());
            notified.as_mut().enable();

            let next_due = {
                let mut state = self.lock();
                state.promote_due(Instant::now());
                if let Some(delivery) = state.ready.pop_front() {
                    state.in_flight += 1;
                    return Some(delivery);
                }
                if state.closed {
                    return None;
                }
                state.next_due()
            };

            match next_due {
                Some(due) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = time::sleep_until(due) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    pub fn ack(&self, delivery: Delivery) {
        debug!(queue = %self.name, delivery_tag = delivery.delivery_tag, "delivery acknowledged");
        self.settle(|_| {});
    }

    /// Schedules the delivery for redelivery, or dead-letters it once it has
    /// been redelivered `max_redeliveries` times.
    pub fn nack(&self, delivery: Delivery, reason: &str) {
        let redelivery = delivery.redelivery_count + 1;
        let delay = self.backoff(redelivery);
        self.settle(|state| {
            if delivery.redelivery_count >= self.max_redeliveries {
                warn!(
                    queue = %self.name,
                    delivery_tag = delivery.delivery_tag,
                    attempts = redelivery,
                    %reason,
                    "delivery dead-lettered"
                );
                if state.dead_letters.len() >= self.dead_letter_limit {
                    state.dead_letters.pop_front();
                    state.dropped_dead_letters += 1;
                }
                state.dead_letters.push_back(DeadLetter {
                    queue: self.name.clone(),
                    delivery_tag: delivery.delivery_tag,
                    attempts: redelivery,
                    reason: reason.to_string(),
                    body: String::from_utf8_lossy(&delivery.body).into_owned(),
                    dead_lettered_at: Utc::now(),
                });
                return;
            }

            let delivery = Delivery {
                redelivery_count: redelivery,
                ..delivery
            };
            if delay.is_zero() {
                state.ready.push_back(delivery);
            } else {
                debug!(
                    queue = %self.name,
                    delivery_tag = delivery.delivery_tag,
                    delay_ms = delay.as_millis() as u64,
                    "redelivery scheduled"
                );
                let key = (Instant::now() + delay, delivery.delivery_tag);
                state.delayed.insert(key, delivery);
            }
        });
        self.available.notify_waiters();
    }

    fn settle(&self, apply: impl FnOnce(&mut QueueState)) {
        let idle = {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            apply(&mut state);
            state.is_idle()
        };
        if idle {
            self.idle.notify_waiters();
        }
    }

    /// Resolves once nothing is ready, waiting for redelivery, or in flight.
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.idle.notified());
            notified.as_mut().enable();
            let idle = self.lock().is_idle();
            if idle {
                return;
            }
            notified.await;
        }
    }

    /// Stops accepting publishes. Consumers drain what is left, including
    /// pending redeliveries without further delay, then stop.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_waiters();
    }

    /// Deliveries ready now or waiting for redelivery.
    pub fn len(&self) -> usize {
        let state = self.lock();
        state.ready.len() + state.delayed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.lock().dead_letters.iter().cloned().collect()
    }

    /// Removes and returns every retained dead letter.
    pub fn take_dead_letters(&self) -> Vec<DeadLetter> {
        self.lock().dead_letters.drain(..).collect()
    }

    /// Dead letters discarded because the retention limit was reached.
    pub fn dropped_dead_letters(&self) -> u64 {
        self.lock().dropped_dead_letters
    }
}
