//! # Handler Invocation Surface
//!
//! The engine calls into externally discovered handler logic through the
//! [`SagaHandler`] trait. Which handler applies to which event or saga
//! type is decided by the host process; the core receives one handler per
//! sequencer.

use crate::association::AssociationValue;
use crate::event::EventMessage;
use crate::saga::Saga;
use async_trait::async_trait;
use thiserror::Error;

/// Outcome directive returned by a handler invocation.
///
/// A handler returns zero or more directives; an empty list is the no-op
/// outcome. Directives are applied to the saga before it is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaDirective {
    /// Register an association for future event routing.
    Associate(AssociationValue),
    /// Withdraw an association.
    Disassociate(AssociationValue),
    /// End the saga; it is removed from the index and cache at commit.
    End,
}

/// Error raised by handler logic. Aborts processing of that single event
/// for that saga; other sagas and events are unaffected.
#[derive(Debug, Error)]
#[error("saga handler failed: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Handler logic invoked for each event dispatched to a saga.
///
/// The handler may mutate `saga.data` directly and steer the saga's
/// associations and lifecycle through the returned directives. The
/// sequencer guarantees exclusive access to the saga for the duration of
/// the call.
#[async_trait]
pub trait SagaHandler: Send + Sync {
    async fn on_event(
        &self,
        saga: &mut Saga,
        event: &EventMessage,
    ) -> Result<Vec<SagaDirective>, HandlerError>;
}

/// Apply handler directives to a saga.
pub(crate) fn apply_directives(saga: &mut Saga, directives: Vec<SagaDirective>) {
    for directive in directives {
        match directive {
            SagaDirective::Associate(value) => saga.associate(value),
            SagaDirective::Disassociate(value) => saga.disassociate(&value),
            SagaDirective::End => saga.end(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saga::{SagaId, SagaLifecycle, SagaType};

    #[test]
    fn test_apply_directives() {
        let mut saga = Saga::new(SagaId::new(), SagaType::new("order"));
        let old = AssociationValue::new("orderId", "42");
        let new = AssociationValue::new("orderId", "43");

        apply_directives(&mut saga, vec![SagaDirective::Associate(old.clone())]);
        assert!(saga.associations().contains(&old));

        apply_directives(
            &mut saga,
            vec![
                SagaDirective::Disassociate(old.clone()),
                SagaDirective::Associate(new.clone()),
            ],
        );
        assert!(!saga.associations().contains(&old));
        assert!(saga.associations().contains(&new));

        apply_directives(&mut saga, vec![SagaDirective::End]);
        assert_eq!(saga.lifecycle(), SagaLifecycle::Ended);
        assert!(saga.associations().is_empty());
    }
}
