//! # Saga Repository
//!
//! The repository owns the [`AssociationIndex`] and an identity cache of
//! live saga instances, and delegates durable load/store to the backing
//! store collaborator. While a saga is hot, exactly one in-memory copy of
//! it exists; every concurrent handler observes the same entry and is
//! serialized on its per-saga lock.

use crate::association::{AssociationIndex, AssociationValue};
use crate::port::saga_store::SagaStore;
use crate::saga::{Saga, SagaId, SagaType};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from repository operations, generic over the backing store's
/// error type.
#[derive(Debug, Error)]
pub enum RepositoryError<E> {
    /// The backing store failed to load a saga.
    #[error("saga load failed: {0:?}")]
    Load(E),

    /// The backing store failed to persist a saga. The association index
    /// is untouched when this is returned; commit is all-or-nothing.
    #[error("saga save failed: {0:?}")]
    Save(E),
}

/// A cached saga instance: immutable identity plus the per-saga exclusive
/// lock guarding the mutable entity.
///
/// The lock is a `tokio::sync::Mutex` because it is held across handler
/// invocation and commit, both of which await. Its FIFO fairness gives
/// waiting dispatchers the order in which they arrived.
#[derive(Debug)]
pub struct SagaEntry {
    id: SagaId,
    saga_type: SagaType,
    lock: tokio::sync::Mutex<Saga>,
}

impl SagaEntry {
    fn new(saga: Saga) -> Self {
        Self {
            id: saga.id().clone(),
            saga_type: saga.saga_type().clone(),
            lock: tokio::sync::Mutex::new(saga),
        }
    }

    pub fn id(&self) -> &SagaId {
        &self.id
    }

    pub fn saga_type(&self) -> &SagaType {
        &self.saga_type
    }

    /// Acquire exclusive access to the saga. Hold the guard for the full
    /// handler-invocation-plus-commit span.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, Saga> {
        self.lock.lock().await
    }
}

/// Shared handle to a cached saga.
pub type SagaHandle = Arc<SagaEntry>;

/// Repository over a durable [`SagaStore`], with an in-memory association
/// index and an identity cache of live instances.
#[derive(Debug)]
pub struct SagaRepository<S: SagaStore> {
    store: Arc<S>,
    index: AssociationIndex,
    cache: Mutex<HashMap<SagaId, SagaHandle>>,
}

impl<S: SagaStore> SagaRepository<S> {
    /// Create a repository over the given backing store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            index: AssociationIndex::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The association index. Lookups reflect the most recently completed
    /// commit; mutations go through [`SagaRepository::commit`].
    pub fn index(&self) -> &AssociationIndex {
        &self.index
    }

    /// Union of index lookups across the given association values.
    /// Index-only; does not touch the backing store.
    pub fn matching_ids(&self, values: &[AssociationValue]) -> HashSet<SagaId> {
        let mut ids = HashSet::new();
        for value in values {
            ids.extend(self.index.find_sagas(value));
        }
        ids
    }

    /// Find the live sagas of `saga_type` registered under any of the
    /// given association values, loading cache misses from the backing
    /// store.
    pub async fn find(
        &self,
        saga_type: &SagaType,
        values: &[AssociationValue],
    ) -> Result<Vec<SagaHandle>, RepositoryError<S::Error>> {
        let mut found = Vec::new();
        for id in self.matching_ids(values) {
            if let Some(handle) = self.acquire(saga_type, &id).await? {
                found.push(handle);
            }
        }
        Ok(found)
    }

    /// Get the single live in-memory copy of a saga, loading it from the
    /// backing store if it is not cached. Returns `None` for unknown
    /// identifiers, ended sagas and type mismatches.
    pub async fn acquire(
        &self,
        saga_type: &SagaType,
        saga_id: &SagaId,
    ) -> Result<Option<SagaHandle>, RepositoryError<S::Error>> {
        if let Some(handle) = self.cache.lock().get(saga_id) {
            if handle.saga_type() == saga_type {
                return Ok(Some(Arc::clone(handle)));
            }
            return Ok(None);
        }

        let Some(saga) = self
            .store
            .load(saga_id)
            .await
            .map_err(RepositoryError::Load)?
        else {
            return Ok(None);
        };
        if saga.is_ended() || saga.saga_type() != saga_type {
            return Ok(None);
        }

        // Re-register the loaded saga's associations; idempotent when the
        // index already knows them, and it repopulates the index after a
        // restart.
        for value in saga.associations() {
            self.index.add_association(saga_id, value);
        }
        debug!(saga_id = %saga_id, "loaded saga from backing store");

        // Insert-if-absent: a concurrent loader may have won the race, in
        // which case its entry is the identity and ours is dropped.
        let mut cache = self.cache.lock();
        let handle = cache
            .entry(saga_id.clone())
            .or_insert_with(|| Arc::new(SagaEntry::new(saga)));
        Ok(Some(Arc::clone(handle)))
    }

    /// Allocate a new saga in `Created` state. Cached immediately, but
    /// invisible to [`SagaRepository::find`] until a commit registers at
    /// least one association.
    pub fn create_instance(&self, saga_type: SagaType) -> SagaHandle {
        self.create_instance_with_id(saga_type, SagaId::new())
    }

    /// Allocate a new saga under a caller-chosen identifier.
    pub fn create_instance_with_id(&self, saga_type: SagaType, saga_id: SagaId) -> SagaHandle {
        let handle = Arc::new(SagaEntry::new(Saga::new(saga_id.clone(), saga_type)));
        self.cache.lock().insert(saga_id, Arc::clone(&handle));
        handle
    }

    /// Persist the saga and synchronize the association index to its
    /// current association set.
    ///
    /// The store write happens first; if it fails the index is untouched
    /// and the error surfaces to the caller. An ended saga is fully
    /// removed from the index and evicted from the cache.
    pub async fn commit(&self, saga: &mut Saga) -> Result<(), RepositoryError<S::Error>> {
        if !saga.is_ended() && !saga.associations().is_empty() {
            saga.activate();
        }

        self.store.save(saga).await.map_err(RepositoryError::Save)?;

        if saga.is_ended() {
            self.index.remove_all(saga.id());
            self.cache.lock().remove(saga.id());
            debug!(saga_id = %saga.id(), "saga ended and evicted");
        } else {
            self.index.sync(saga.id(), saga.associations());
            debug!(
                saga_id = %saga.id(),
                associations = saga.associations().len(),
                "saga committed"
            );
        }
        Ok(())
    }

    /// Evict every cache entry, forcing subsequent finds to reload from
    /// the backing store. The index survives. Idempotent; a consistency
    /// checkpoint for diagnostics, not a hot-path operation.
    pub fn purge_cache(&self) {
        let evicted = {
            let mut cache = self.cache.lock();
            let n = cache.len();
            cache.clear();
            n
        };
        info!(evicted, "saga cache purged");
    }

    /// Number of live cached instances.
    pub fn cached_count(&self) -> usize {
        self.cache.lock().len()
    }
}
