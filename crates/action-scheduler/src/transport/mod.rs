//! In-process stand-ins for the message broker: bounded inbound queues with
//! ack/nack settlement, a consumer pool, and a transactional outbound exchange.

pub mod consumer;
pub mod exchange;
pub mod queue;

pub use consumer::{spawn_consumers, MessageHandler};
pub use exchange::{InMemoryExchange, OutboundPublisher, PublishError, PublishedMessage};
pub use queue::{DeadLetter, Delivery, InboundQueue, TransportError};
