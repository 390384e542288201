//! # TriggerCallback Port
//!
//! The optional hook protocol invoked around a deadline event's delivery.
//! It is a capability interface, not a hierarchy: a no-op implementation
//! stands in when the host registers nothing.

use crate::event::EventMessage;
use crate::port::event_bus::EventBusError;
use async_trait::async_trait;

/// Hooks invoked by the firing routine around event publication.
///
/// Per firing attempt, `before_publication` runs before `publish`, and
/// exactly one of `after_publication_success` /
/// `after_publication_failure` runs after it.
#[async_trait]
pub trait TriggerCallback: Send + Sync {
    /// Invoked before the event is handed to the bus.
    async fn before_publication(&self, event: &EventMessage);

    /// Invoked after the bus accepted the event.
    async fn after_publication_success(&self);

    /// Invoked after the bus rejected the event, before the error is
    /// re-signaled to the scheduler.
    async fn after_publication_failure(&self, error: &EventBusError);
}

/// Default callback used when none is registered; every hook is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTriggerCallback;

#[async_trait]
impl TriggerCallback for NoOpTriggerCallback {
    async fn before_publication(&self, _event: &EventMessage) {}

    async fn after_publication_success(&self) {}

    async fn after_publication_failure(&self, _error: &EventBusError) {}
}
