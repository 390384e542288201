//! # Saga Entity
//!
//! A [`Saga`] is a long-lived, stateful process instance correlated to
//! events through its association values. The entity itself is the
//! snapshot the backing store persists.

use crate::association::AssociationValue;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Opaque saga identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SagaId(pub String);

impl SagaId {
    /// Allocate a fresh random identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SagaId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SagaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type tag distinguishing saga kinds managed by the same repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SagaType(pub String);

impl SagaType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SagaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a saga.
///
/// `Created -> Active` on the first commit that registers an association;
/// `Active -> Ended` when handler logic ends the saga. There is no
/// transition out of `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaLifecycle {
    Created,
    Active,
    Ended,
}

/// A saga instance: identity, type, lifecycle, associations and
/// handler-owned state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Saga {
    id: SagaId,
    saga_type: SagaType,
    lifecycle: SagaLifecycle,
    associations: HashSet<AssociationValue>,
    /// Opaque state owned by handler logic, persisted with the saga.
    pub data: serde_json::Value,
}

impl Saga {
    /// Create a saga in `Created` state with no associations.
    pub fn new(id: SagaId, saga_type: SagaType) -> Self {
        Self {
            id,
            saga_type,
            lifecycle: SagaLifecycle::Created,
            associations: HashSet::new(),
            data: serde_json::Value::Null,
        }
    }

    pub fn id(&self) -> &SagaId {
        &self.id
    }

    pub fn saga_type(&self) -> &SagaType {
        &self.saga_type
    }

    pub fn lifecycle(&self) -> SagaLifecycle {
        self.lifecycle
    }

    /// The association values this saga currently declares. The index is
    /// synchronized to this set at commit time.
    pub fn associations(&self) -> &HashSet<AssociationValue> {
        &self.associations
    }

    /// Whether the saga has ended. An ended saga holds no live
    /// associations and is never dispatched to again.
    pub fn is_ended(&self) -> bool {
        self.lifecycle == SagaLifecycle::Ended
    }

    /// Declare an association. Effective at the next commit.
    pub fn associate(&mut self, value: AssociationValue) {
        if self.lifecycle == SagaLifecycle::Ended {
            return;
        }
        self.associations.insert(value);
    }

    /// Withdraw an association. Effective at the next commit.
    pub fn disassociate(&mut self, value: &AssociationValue) {
        self.associations.remove(value);
    }

    /// End the saga. Irreversible; drops all declared associations.
    pub fn end(&mut self) {
        self.lifecycle = SagaLifecycle::Ended;
        self.associations.clear();
    }

    /// Promote `Created -> Active`. Called by the repository on the first
    /// commit that registers at least one association.
    pub(crate) fn activate(&mut self) {
        if self.lifecycle == SagaLifecycle::Created {
            self.lifecycle = SagaLifecycle::Active;
        }
    }
}
