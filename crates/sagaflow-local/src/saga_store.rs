//! # In-Memory SagaStore
//!
//! Thread-safe saga persistence without a database, for local use and
//! tests. Supports one-shot failure injection to exercise the
//! repository's error paths.

use async_trait::async_trait;
use parking_lot::RwLock;
use sagaflow_core::port::saga_store::SagaStore;
use sagaflow_core::saga::{Saga, SagaId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Errors from [`InMemorySagaStore`] operations. Only produced through
/// failure injection.
#[derive(Debug, Error)]
pub enum InMemorySagaStoreError {
    #[error("injected load failure")]
    InjectedLoad,

    #[error("injected save failure")]
    InjectedSave,
}

/// In-memory saga store backed by a `HashMap` under an `RwLock`.
#[derive(Debug, Default)]
pub struct InMemorySagaStore {
    sagas: RwLock<HashMap<SagaId, Saga>>,
    fail_next_load: AtomicBool,
    fail_next_save: AtomicBool,
}

impl InMemorySagaStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `load` fail once.
    pub fn fail_next_load(&self) {
        self.fail_next_load.store(true, Ordering::SeqCst);
    }

    /// Make the next `save` fail once.
    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }

    /// Number of persisted sagas.
    pub fn len(&self) -> usize {
        self.sagas.read().len()
    }

    /// Whether the store holds no sagas.
    pub fn is_empty(&self) -> bool {
        self.sagas.read().is_empty()
    }

    /// Direct snapshot of a persisted saga, bypassing the repository.
    pub fn snapshot(&self, saga_id: &SagaId) -> Option<Saga> {
        self.sagas.read().get(saga_id).cloned()
    }
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    type Error = InMemorySagaStoreError;

    async fn load(&self, saga_id: &SagaId) -> Result<Option<Saga>, Self::Error> {
        if self.fail_next_load.swap(false, Ordering::SeqCst) {
            return Err(InMemorySagaStoreError::InjectedLoad);
        }
        Ok(self.sagas.read().get(saga_id).cloned())
    }

    async fn save(&self, saga: &Saga) -> Result<(), Self::Error> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(InMemorySagaStoreError::InjectedSave);
        }
        self.sagas.write().insert(saga.id().clone(), saga.clone());
        Ok(())
    }
}
