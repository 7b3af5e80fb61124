use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::queue::InboundQueue;

/// Processes one delivery body. `Err` nacks the delivery for redelivery.
pub trait MessageHandler: Send + Sync + 'static {
    type Error: std::error::Error + Send + 'static;

    fn handle(&self, body: &[u8]) -> Result<(), Self::Error>;
}

/// Starts `consumers` workers on the queue. Each worker runs one delivery to
/// completion on the blocking pool before taking the next.
pub fn spawn_consumers<H>(
    queue: Arc<InboundQueue>,
    handler: Arc<H>,
    consumers: usize,
) -> Vec<JoinHandle<()>>
where
    H: MessageHandler,
{
    (0..consumers.max(1))
        .map(|worker| tokio::spawn(consume(worker, queue.clone(), handler.clone())))
        .collect()
}

async fn consume<H>(worker: usize, queue: Arc<InboundQueue>, handler: Arc<H>)
where
    H: MessageHandler,
{
    while let Some(delivery) = queue.receive().await {
        let body = delivery.body.clone();
        let handler = handler.clone();
        let outcome = tokio::task::spawn_blocking(move || handler.handle(&body)).await;

        match outcome {
            Ok(Ok(())) => queue.ack(delivery),
            Ok(Err(err)) => {
                warn!(
                    queue = queue.name(),
                    worker,
                    delivery_tag = delivery.delivery_tag,
                    redelivery_count = delivery.redelivery_count,
                    error = %err,
                    "delivery failed"
                );
                queue.nack(delivery, &err.to_string());
            }
            Err(join_error) => {
                error!(
                    queue = queue.name(),
                    worker,
                    delivery_tag = delivery.delivery_tag,
                    error = %join_error,
                    "handler aborted"
                );
                queue.nack(delivery, "handler aborted");
            }
        }
    }

    debug!(queue = queue.name(), worker, "consumer stopped");
}
