//! # SagaStore Port
//!
//! Durable persistence for saga snapshots. The repository is the only
//! caller; storage format and transport are implementation-defined. The
//! store must provide per-saga durability of `save`; cross-saga
//! transactions are not assumed.

use crate::saga::{Saga, SagaId};
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for durable saga storage.
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// The error type for this implementation.
    type Error: Debug + Send + Sync + 'static;

    /// Load a saga snapshot by identifier. `Ok(None)` means not found.
    async fn load(&self, saga_id: &SagaId) -> Result<Option<Saga>, Self::Error>;

    /// Persist a saga snapshot, replacing any previous one.
    async fn save(&self, saga: &Saga) -> Result<(), Self::Error>;
}
