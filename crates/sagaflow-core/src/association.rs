//! # Association Values and the Association Index
//!
//! An [`AssociationValue`] is the correlation key that routes an event to
//! the saga instances that registered it. The [`AssociationIndex`] is the
//! bidirectional in-memory mapping between association values and saga
//! identifiers.

use crate::saga::SagaId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// An immutable `(key, value)` correlation pair.
///
/// Two association values are equal iff both fields match. A "changed"
/// association is always modeled as remove-old + add-new; the pair itself
/// is never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssociationValue {
    key: String,
    value: String,
}

impl AssociationValue {
    /// Create a new association value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// The association key (e.g. `"orderId"`).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The association value (e.g. the order's identifier).
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Display for AssociationValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Raised when the forward and reverse maps of the index disagree.
///
/// Under correct locking this can never happen; it is a fatal invariant
/// violation, surfaced by [`AssociationIndex::verify_consistency`].
#[derive(Debug, Error)]
pub enum AssociationIndexError {
    #[error("forward entry {value} -> {saga_id} has no matching reverse entry")]
    OrphanedForward {
        value: AssociationValue,
        saga_id: SagaId,
    },

    #[error("reverse entry {saga_id} -> {value} has no matching forward entry")]
    OrphanedReverse {
        saga_id: SagaId,
        value: AssociationValue,
    },
}

#[derive(Debug, Default)]
struct IndexInner {
    /// value -> saga identifiers registered under it.
    forward: HashMap<AssociationValue, HashSet<SagaId>>,
    /// saga identifier -> the values it currently holds.
    reverse: HashMap<SagaId, HashSet<AssociationValue>>,
}

impl IndexInner {
    fn add(&mut self, saga_id: &SagaId, value: &AssociationValue) {
        self.forward
            .entry(value.clone())
            .or_default()
            .insert(saga_id.clone());
        self.reverse
            .entry(saga_id.clone())
            .or_default()
            .insert(value.clone());
    }

    fn remove(&mut self, saga_id: &SagaId, value: &AssociationValue) {
        if let Some(ids) = self.forward.get_mut(value) {
            ids.remove(saga_id);
            if ids.is_empty() {
                self.forward.remove(value);
            }
        }
        if let Some(values) = self.reverse.get_mut(saga_id) {
            values.remove(value);
            if values.is_empty() {
                self.reverse.remove(saga_id);
            }
        }
    }
}

/// Bidirectional mapping between association values and saga identifiers.
///
/// Both directions live under a single `RwLock`, so every mutation is
/// atomic across the forward and reverse maps: a lookup concurrent with
/// an association rewrite observes either the pre- or the post-swap
/// state, never a torn update.
#[derive(Debug, Default)]
pub struct AssociationIndex {
    inner: RwLock<IndexInner>,
}

impl AssociationIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value -> saga_id` in both directions. Idempotent.
    pub fn add_association(&self, saga_id: &SagaId, value: &AssociationValue) {
        let mut inner = self.inner.write();
        inner.add(saga_id, value);
    }

    /// Remove `value -> saga_id` from both directions. No-op if absent.
    pub fn remove_association(&self, saga_id: &SagaId, value: &AssociationValue) {
        let mut inner = self.inner.write();
        inner.remove(saga_id, value);
    }

    /// The saga identifiers currently registered under `value`.
    pub fn find_sagas(&self, value: &AssociationValue) -> HashSet<SagaId> {
        let inner = self.inner.read();
        inner.forward.get(value).cloned().unwrap_or_default()
    }

    /// All association values a saga currently holds.
    pub fn associations_of(&self, saga_id: &SagaId) -> HashSet<AssociationValue> {
        let inner = self.inner.read();
        inner.reverse.get(saga_id).cloned().unwrap_or_default()
    }

    /// Replace a saga's registered associations with `desired`.
    ///
    /// The diff (additions and removals) is applied under a single write
    /// lock, so a commit that rewrites an association is one
    /// linearization point with respect to concurrent lookups.
    pub fn sync(&self, saga_id: &SagaId, desired: &HashSet<AssociationValue>) {
        let mut inner = self.inner.write();
        let current = inner.reverse.get(saga_id).cloned().unwrap_or_default();
        for removed in current.difference(desired) {
            let removed = removed.clone();
            inner.remove(saga_id, &removed);
        }
        for added in desired.difference(&current) {
            let added = added.clone();
            inner.add(saga_id, &added);
        }
    }

    /// Remove every association a saga holds. Used when a saga ends.
    pub fn remove_all(&self, saga_id: &SagaId) {
        let mut inner = self.inner.write();
        let values = inner.reverse.remove(saga_id).unwrap_or_default();
        for value in values {
            if let Some(ids) = inner.forward.get_mut(&value) {
                ids.remove(saga_id);
                if ids.is_empty() {
                    inner.forward.remove(&value);
                }
            }
        }
    }

    /// Number of distinct association values currently registered.
    pub fn len(&self) -> usize {
        self.inner.read().forward.len()
    }

    /// Whether the index holds no associations at all.
    pub fn is_empty(&self) -> bool {
        self.inner.read().forward.is_empty()
    }

    /// Check that forward and reverse maps are mutually derivable.
    ///
    /// Diagnostic operation; a failure means the locking discipline was
    /// violated somewhere and must be treated as fatal.
    pub fn verify_consistency(&self) -> Result<(), AssociationIndexError> {
        let inner = self.inner.read();
        for (value, ids) in &inner.forward {
            for id in ids {
                let ok = inner
                    .reverse
                    .get(id)
                    .map(|values| values.contains(value))
                    .unwrap_or(false);
                if !ok {
                    return Err(AssociationIndexError::OrphanedForward {
                        value: value.clone(),
                        saga_id: id.clone(),
                    });
                }
            }
        }
        for (id, values) in &inner.reverse {
            for value in values {
                let ok = inner
                    .forward
                    .get(value)
                    .map(|ids| ids.contains(id))
                    .unwrap_or(false);
                if !ok {
                    return Err(AssociationIndexError::OrphanedReverse {
                        saga_id: id.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn value(n: u32) -> AssociationValue {
        AssociationValue::new("key", format!("value-{n}"))
    }

    #[test]
    fn test_association_value_equality() {
        let a = AssociationValue::new("orderId", "42");
        let b = AssociationValue::new("orderId", "42");
        let c = AssociationValue::new("orderId", "43");
        let d = AssociationValue::new("customerId", "42");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_add_and_find() {
        let index = AssociationIndex::new();
        let id = SagaId::new();

        index.add_association(&id, &value(1));
        assert!(index.find_sagas(&value(1)).contains(&id));
        assert!(index.find_sagas(&value(2)).is_empty());

        // idempotent
        index.add_association(&id, &value(1));
        assert_eq!(index.find_sagas(&value(1)).len(), 1);
        assert_eq!(index.associations_of(&id).len(), 1);
    }

    #[test]
    fn test_remove_is_noop_when_absent() {
        let index = AssociationIndex::new();
        let id = SagaId::new();

        index.remove_association(&id, &value(1));
        assert!(index.find_sagas(&value(1)).is_empty());
        index.verify_consistency().unwrap();
    }

    #[test]
    fn test_rewrite_is_atomic() {
        let index = AssociationIndex::new();
        let id = SagaId::new();
        index.add_association(&id, &value(0));

        let mut desired = std::collections::HashSet::new();
        desired.insert(value(1));
        index.sync(&id, &desired);

        assert!(index.find_sagas(&value(0)).is_empty());
        assert!(index.find_sagas(&value(1)).contains(&id));
        index.verify_consistency().unwrap();
    }

    #[test]
    fn test_remove_all() {
        let index = AssociationIndex::new();
        let id = SagaId::new();
        index.add_association(&id, &value(1));
        index.add_association(&id, &value(2));

        index.remove_all(&id);
        assert!(index.find_sagas(&value(1)).is_empty());
        assert!(index.find_sagas(&value(2)).is_empty());
        assert!(index.associations_of(&id).is_empty());
        assert!(index.is_empty());
        index.verify_consistency().unwrap();
    }

    #[test]
    fn test_consistency_under_concurrent_mutation() {
        let index = Arc::new(AssociationIndex::new());
        let mut handles = Vec::new();

        for t in 0..8u32 {
            let index = Arc::clone(&index);
            handles.push(std::thread::spawn(move || {
                let id = SagaId::new();
                for i in 0..200u32 {
                    index.add_association(&id, &value(t * 1000 + i));
                    if i % 2 == 0 {
                        index.remove_association(&id, &value(t * 1000 + i));
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        index.verify_consistency().unwrap();
    }
}
