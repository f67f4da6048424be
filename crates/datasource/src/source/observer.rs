//! Observer registration with RAII unsubscription.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::source::lock;

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: u64,
    entries: Vec<(u64, Callback<E>)>,
}

/// An ordered set of observers for events of type `E`.
///
/// Observers run in registration order, outside the registry lock, so an
/// observer may register or cancel other observers while being notified.
pub struct Observers<E> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E: 'static> Observers<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub fn register<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register_arc(Arc::new(observer))
    }

    pub fn register_arc(&self, observer: Callback<E>) -> Subscription {
        let id = {
            let mut registry = lock(&self.registry, "observer registry");
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.push((id, observer));
            id
        };

        let weak: Weak<Mutex<Registry<E>>> = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = weak.upgrade() {
                lock(&registry, "observer registry")
                    .entries
                    .retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Invokes every registered observer with `event`.
    pub fn notify(&self, event: &E) {
        let snapshot: Vec<Callback<E>> = lock(&self.registry, "observer registry")
            .entries
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for observer in snapshot {
            observer(event);
        }
    }

    pub fn clear(&self) {
        lock(&self.registry, "observer registry").entries.clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.registry, "observer registry").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: 'static> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for Observers<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E> fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers").finish_non_exhaustive()
    }
}

/// Handle for a registered observer. Dropping it unregisters the observer.
#[must_use = "dropping a Subscription unregisters the observer immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle that unregisters nothing.
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    /// Unregisters now. Later calls and the eventual drop do nothing.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keeps the observer registered for the lifetime of its source.
    pub fn detach(mut self) {
        self.cancel = None;
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
