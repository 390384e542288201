//! # EventBus Port
//!
//! The narrow publishing interface the engine requires from the event
//! transport. Subscription and filtering are the host's concern.

use crate::event::EventMessage;
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised when the bus cannot accept a delivery.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// The bus rejected the event.
    #[error("publish rejected: {0}")]
    Rejected(String),

    /// The transport is unreachable.
    #[error("event bus connection lost: {0}")]
    ConnectionLost(String),
}

/// Trait for publishing events to the host's event stream.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event. Fails if delivery cannot be accepted.
    async fn publish(&self, event: EventMessage) -> Result<(), EventBusError>;
}
