//! Synthesized identity for values that carry none of their own.

use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{ComparisonResults, UniqueIdentifier, UniquelyIdentifiable};

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Identity made of a content hash and a process-wide wrapping instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashIdentity {
    hash: u64,
    instance: u64,
}

impl HashIdentity {
    pub fn new(hash: u64, instance: u64) -> Self {
        Self { hash, instance }
    }

    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }
}

impl UniqueIdentifier for HashIdentity {
    fn equals(&self, other: &dyn UniqueIdentifier) -> bool {
        other
            .as_any()
            .downcast_ref::<HashIdentity>()
            .is_some_and(|other| other == self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Wraps an arbitrary hashable value so it can live in a data source.
///
/// Every call to [`IdentityWrapper::new`] draws a fresh instance number; clones
/// share it. Two wrappers of equal values are therefore equivalent but not the
/// same item.
pub struct IdentityWrapper<V> {
    value: Arc<V>,
    identity: HashIdentity,
}

impl<V: Hash> IdentityWrapper<V> {
    pub fn new(value: V) -> Self {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);

        Self {
            value: Arc::new(value),
            identity: HashIdentity::new(hasher.finish(), instance),
        }
    }
}

impl<V> IdentityWrapper<V> {
    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn identity(&self) -> HashIdentity {
        self.identity
    }
}

impl<V> Clone for IdentityWrapper<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            identity: self.identity,
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for IdentityWrapper<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityWrapper")
            .field("value", &self.value)
            .field("identity", &self.identity)
            .finish()
    }
}

impl<V: Send + Sync + 'static> UniquelyIdentifiable for IdentityWrapper<V> {
    fn identifier(&self) -> &dyn UniqueIdentifier {
        &self.identity
    }

    fn compare(&self, other: Option<&dyn UniquelyIdentifiable>) -> ComparisonResults {
        let Some(other) = other else {
            return ComparisonResults::DIFFERENT;
        };

        let Some(theirs) = other.identifier().as_any().downcast_ref::<HashIdentity>() else {
            return ComparisonResults::DIFFERENT | ComparisonResults::INVALIDATING;
        };

        let same_hash = theirs.hash == self.identity.hash;
        let same_instance = theirs.instance == self.identity.instance;

        match (same_instance, same_hash) {
            (true, true) => ComparisonResults::MATCH,
            (false, true) => ComparisonResults::DIFFERENT_BUT_EQUIVALENT,
            // Same wrapping but the value hashed differently: stale.
            (true, false) => ComparisonResults::DIFFERENT | ComparisonResults::INVALIDATING,
            (false, false) => ComparisonResults::DIFFERENT,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
