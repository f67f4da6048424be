use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::error::{DataSourceError, Result};
use crate::source::{
    lock, BoxedDataSource, ChangeEvent, ChangeKind, ChangeObserver, DataSource, LazyItem,
    Observers, SourceItem, Subscription,
};

struct MemoryState<T> {
    items: Vec<(String, T)>,
    sub_sources: Vec<Arc<dyn DataSource<T>>>,
    disposed: bool,
}

/// A keyed in-memory source that items are pushed into.
///
/// Mutations raise the same events a folder source raises for the
/// equivalent file-system change. Items keep their insertion order.
pub struct MemoryDataSource<T> {
    name: String,
    state: Mutex<MemoryState<T>>,
    observers: Observers<ChangeEvent<T>>,
}

impl<T: SourceItem> MemoryDataSource<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(MemoryState {
                items: Vec::new(),
                sub_sources: Vec::new(),
                disposed: false,
            }),
            observers: Observers::new(),
        }
    }

    /// Adds `item` under `key`, replacing any item already there.
    pub fn insert(&self, key: impl Into<String>, item: T) {
        let key = key.into();
        {
            let mut state = lock(&self.state, "memory source");
            if state.disposed {
                return;
            }
            if let Some(slot) = state.items.iter_mut().find(|(k, _)| *k == key) {
                warn!("'{}': duplicate add for '{}', replacing", self.name, key);
                slot.1 = item.clone();
            } else {
                state.items.push((key.clone(), item.clone()));
            }
        }
        self.raise(ChangeEvent::new(ChangeKind::Added, key, LazyItem::ready(item)));
    }

    /// Replaces the item under `key`, adding it when absent.
    pub fn update(&self, key: impl Into<String>, item: T) {
        let key = key.into();
        {
            let mut state = lock(&self.state, "memory source");
            if state.disposed {
                return;
            }
            match state.items.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = item.clone(),
                None => state.items.push((key.clone(), item.clone())),
            }
        }
        self.raise(ChangeEvent::new(ChangeKind::Changed, key, LazyItem::ready(item)));
    }

    /// Moves the item under `from` to `to`, storing `item` as the moved value.
    pub fn rename(&self, from: &str, to: impl Into<String>, item: T) {
        let to = to.into();
        {
            let mut state = lock(&self.state, "memory source");
            if state.disposed {
                return;
            }
            state.items.retain(|(k, _)| k != from && *k != to);
            state.items.push((to.clone(), item.clone()));
        }
        self.raise(ChangeEvent::moved(to, from, LazyItem::ready(item)));
    }

    /// Removes the item under `key`. The event carries the removed item.
    pub fn remove(&self, key: &str) -> Option<T> {
        let removed = {
            let mut state = lock(&self.state, "memory source");
            if state.disposed {
                return None;
            }
            let position = state.items.iter().position(|(k, _)| k == key);
            position.map(|i| state.items.remove(i).1)
        };

        let lazy = match &removed {
            Some(item) => LazyItem::ready(item.clone()),
            None => LazyItem::empty(),
        };
        self.raise(ChangeEvent::new(ChangeKind::Removed, key, lazy));
        removed
    }

    pub fn add_sub_source(&self, source: impl DataSource<T> + 'static) {
        lock(&self.state, "memory source")
            .sub_sources
            .push(Arc::new(source));
    }

    pub fn get(&self, key: &str) -> Option<T> {
        lock(&self.state, "memory source")
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, item)| item.clone())
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.state, "memory source").disposed
    }

    fn raise(&self, event: ChangeEvent<T>) {
        debug!("'{}': {} {}", self.name, event.kind(), event.key());
        self.observers.notify(&event);
    }
}

impl<T: SourceItem> DataSource<T> for MemoryDataSource<T> {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn count(&self) -> usize {
        lock(&self.state, "memory source").items.len()
    }

    fn items(&self) -> Vec<T> {
        lock(&self.state, "memory source")
            .items
            .iter()
            .map(|(_, item)| item.clone())
            .collect()
    }

    fn sub_sources(&self) -> Result<Vec<BoxedDataSource<T>>> {
        Ok(lock(&self.state, "memory source")
            .sub_sources
            .iter()
            .map(|s| Box::new(Arc::clone(s)) as BoxedDataSource<T>)
            .collect())
    }

    fn subscribe(&self, observer: ChangeObserver<T>) -> Subscription {
        if self.is_disposed() {
            return Subscription::empty();
        }
        self.observers.register_arc(observer)
    }

    fn dispose(&self) -> Result<()> {
        let sub_sources = {
            let mut state = lock(&self.state, "memory source");
            if state.disposed {
                return Ok(());
            }
            state.disposed = true;
            std::mem::take(&mut state.sub_sources)
        };
        self.observers.clear();

        let errors: Vec<DataSourceError> = sub_sources
            .iter()
            .filter_map(|source| source.dispose().err())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            warn!(
                "'{}': {} sub-source(s) failed to dispose",
                self.name,
                errors.len()
            );
            Err(DataSourceError::Aggregate(errors))
        }
    }
}
