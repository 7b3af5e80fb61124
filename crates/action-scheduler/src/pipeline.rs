use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use crate::config::QueueConfig;
use crate::store::ActionStore;
use crate::transport::{spawn_consumers, InboundQueue, OutboundPublisher};
use crate::workflows::fulfilment::{
    FulfilmentRequestService, FulfilmentScheduler, IntervalTicker, TickReport, UacQidIssuer,
};
use crate::workflows::ingestion::EventIngestor;

/// Wires inbound queues, consumer pools, and the fulfilment scheduler around one store.
pub struct Pipeline<S, I, P> {
    queues: QueueConfig,
    store: Arc<S>,
    issuer: Arc<I>,
    publisher: Arc<P>,
}

impl<S, I, P> Pipeline<S, I, P>
where
    S: ActionStore + 'static,
    I: UacQidIssuer + 'static,
    P: OutboundPublisher + 'static,
{
    pub fn new(queues: QueueConfig, store: Arc<S>, issuer: Arc<I>, publisher: Arc<P>) -> Self {
        Self {
            queues,
            store,
            issuer,
            publisher,
        }
    }

    /// Spawns consumers and the scheduler loop. Must run inside a tokio runtime.
    pub fn start(self, interval: Duration) -> PipelineHandle<S, P> {
        let case_queue = Arc::new(
            InboundQueue::new(
                self.queues.inbound_queue.clone(),
                self.queues.prefetch,
                self.queues.max_redeliveries,
            )
            .with_redelivery_delay(self.queues.redelivery_delay)
            .with_dead_letter_limit(self.queues.dead_letter_limit),
        );
        let fulfilment_queue = Arc::new(
            InboundQueue::new(
                self.queues.fulfilment_queue.clone(),
                self.queues.prefetch,
                self.queues.max_redeliveries,
            )
            .with_redelivery_delay(self.queues.redelivery_delay)
            .with_dead_letter_limit(self.queues.dead_letter_limit),
        );

        let ingestor = Arc::new(EventIngestor::new(self.store.clone()));
        let fulfilments = Arc::new(FulfilmentRequestService::new(
            self.store.clone(),
            self.issuer,
        ));

        let mut workers = spawn_consumers(case_queue.clone(), ingestor, self.queues.consumers);
        workers.extend(spawn_consumers(
            fulfilment_queue.clone(),
            fulfilments,
            self.queues.consumers,
        ));

        let scheduler = Arc::new(FulfilmentScheduler::new(
            self.store.clone(),
            self.publisher,
            self.queues.outbound_exchange.clone(),
        ));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let ticker = IntervalTicker::new(interval, shutdown_rx);
        let scheduler_task = tokio::spawn(scheduler.clone().run(ticker));

        info!(
            case_queue = %self.queues.inbound_queue,
            fulfilment_queue = %self.queues.fulfilment_queue,
            consumers = self.queues.consumers,
            interval_secs = interval.as_secs(),
            "pipeline started"
        );

        PipelineHandle {
            store: self.store,
            case_queue,
            fulfilment_queue,
            scheduler,
            shutdown,
            workers,
            scheduler_task,
        }
    }
}

/// Running pipeline. Dropping it without [`PipelineHandle::shutdown`] leaves tasks running.
pub struct PipelineHandle<S, P> {
    store: Arc<S>,
    case_queue: Arc<InboundQueue>,
    fulfilment_queue: Arc<InboundQueue>,
    scheduler: Arc<FulfilmentScheduler<S, P>>,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    scheduler_task: JoinHandle<()>,
}

impl<S, P> PipelineHandle<S, P>
where
    S: ActionStore + 'static,
    P: OutboundPublisher + 'static,
{
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn case_queue(&self) -> &Arc<InboundQueue> {
        &self.case_queue
    }

    pub fn fulfilment_queue(&self) -> &Arc<InboundQueue> {
        &self.fulfilment_queue
    }

    /// Waits until both inbound queues have nothing ready or in flight.
    pub async fn drain(&self) {
        self.case_queue.wait_idle().await;
        self.fulfilment_queue.wait_idle().await;
    }

    /// Runs one scheduler tick outside the regular cadence.
    pub async fn trigger_now(&self) -> Result<TickReport, JoinError> {
        let scheduler = self.scheduler.clone();
        tokio::task::spawn_blocking(move || scheduler.tick(Utc::now())).await
    }

    /// Stops the scheduler, closes both queues, and waits for consumers to drain them.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        self.case_queue.close();
        self.fulfilment_queue.close();

        if let Err(err) = self.scheduler_task.await {
            warn!(error = %err, "scheduler task ended abnormally");
        }
        for worker in self.workers {
            if let Err(err) = worker.await {
                warn!(error = %err, "consumer task ended abnormally");
            }
        }

        info!("pipeline stopped");
    }
}
