//! # Recording EventBus
//!
//! An in-process bus that appends every published event to a log.
//! Doubles as the delivery target in deadline tests, with one-shot
//! publish-failure injection.

use async_trait::async_trait;
use parking_lot::Mutex;
use sagaflow_core::event::EventMessage;
use sagaflow_core::port::event_bus::{EventBus, EventBusError};
use std::sync::atomic::{AtomicBool, Ordering};

/// Event bus that records published events in memory.
#[derive(Debug, Default)]
pub struct RecordingEventBus {
    events: Mutex<Vec<EventMessage>>,
    fail_next: AtomicBool,
}

impl RecordingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `publish` fail once.
    pub fn fail_next_publish(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// All events published so far, in publication order.
    pub fn recorded(&self) -> Vec<EventMessage> {
        self.events.lock().clone()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing has been published.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl EventBus for RecordingEventBus {
    async fn publish(&self, event: EventMessage) -> Result<(), EventBusError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(EventBusError::Rejected("injected publish failure".to_string()));
        }
        self.events.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_in_order() {
        let bus = RecordingEventBus::new();
        for n in 0..3 {
            bus.publish(EventMessage::new("t", serde_json::json!({ "n": n })))
                .await
                .unwrap();
        }

        let recorded = bus.recorded();
        assert_eq!(recorded.len(), 3);
        assert_eq!(recorded[0].payload["n"], 0);
        assert_eq!(recorded[2].payload["n"], 2);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let bus = RecordingEventBus::new();
        bus.fail_next_publish();
        assert!(bus
            .publish(EventMessage::new("t", serde_json::Value::Null))
            .await
            .is_err());
        assert!(bus.is_empty());

        bus.publish(EventMessage::new("t", serde_json::Value::Null))
            .await
            .unwrap();
        assert_eq!(bus.len(), 1);
    }
}
