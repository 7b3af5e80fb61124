use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outbound side of the transport. A call publishes every payload or none.
pub trait OutboundPublisher: Send + Sync {
    fn publish_all(
        &self,
        exchange: &str,
        routing_key: &str,
        payloads: Vec<Vec<u8>>,
    ) -> Result<(), PublishError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("exchange '{0}' unavailable")]
    Unavailable(String),
    #[error("publish rejected: {0}")]
    Rejected(String),
}

/// Message as recorded by [`InMemoryExchange`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub body: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

/// Exchange that keeps every committed message in memory.
#[derive(Debug, Default)]
pub struct InMemoryExchange {
    messages: Mutex<Vec<PublishedMessage>>,
}

impl InMemoryExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl OutboundPublisher for InMemoryExchange {
    fn publish_all(
        &self,
        exchange: &str,
        routing_key: &str,
        payloads: Vec<Vec<u8>>,
    ) -> Result<(), PublishError> {
        let published_at = Utc::now();
        let staged = payloads
            .iter()
            .map(|payload| {
                serde_json::from_slice(payload)
                    .map(|body| PublishedMessage {
                        exchange: exchange.to_string(),
                        routing_key: routing_key.to_string(),
                        body,
                        published_at,
                    })
                    .map_err(|err| PublishError::Rejected(err.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.messages
            .lock()
            .map_err(|_| PublishError::Unavailable(exchange.to_string()))?
            .extend(staged);
        Ok(())
    }
}
