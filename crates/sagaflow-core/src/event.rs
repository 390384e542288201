//! # Event Messages
//!
//! [`EventMessage`] is the unit that flows through the engine: the bus
//! publishes it, the sequencer dispatches it to sagas, and deadline jobs
//! carry it for future delivery.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A domain event with identity, type tag and opaque payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    /// Unique event identifier.
    pub id: Uuid,
    /// Event type tag (e.g. `"order.shipped"`).
    pub event_type: String,
    /// Opaque event payload.
    pub payload: serde_json::Value,
    /// When the event occurred.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl EventMessage {
    /// Create an event with a fresh identifier and the current time.
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            payload,
            timestamp: chrono::Utc::now(),
        }
    }
}
