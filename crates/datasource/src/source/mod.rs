//! The data source contract and the generic sources built on it.
//!
//! A [`DataSource`] is an enumerable collection of uniquely identifiable items
//! that reports incremental changes as [`ChangeEvent`]s. Sources can expose
//! nested sub-sources, be merged ([`CompositeDataSource`]) or mapped
//! ([`TransformDataSource`]).

pub mod composite;
pub mod memory;
pub mod observer;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::{Bindings, BoundConfiguration, Configurable};
use crate::error::Result;
use crate::identity::UniquelyIdentifiable;

pub use composite::CompositeDataSource;
pub use memory::MemoryDataSource;
pub use observer::{Observers, Subscription};
pub use transform::{EventMap, ItemMap, NameFactory, SubSourceMap, TransformDataSource};

/// Kind of change reported by a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Changed,
    Moved,
    Removed,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 4] = [
        ChangeKind::Added,
        ChangeKind::Changed,
        ChangeKind::Moved,
        ChangeKind::Removed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Changed => "changed",
            ChangeKind::Moved => "moved",
            ChangeKind::Removed => "removed",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Init<T> = Box<dyn FnOnce() -> Option<T> + Send>;

struct LazyInner<T> {
    cell: OnceLock<Option<T>>,
    init: Mutex<Option<Init<T>>>,
}

/// An item resolved on first access and then shared by every clone.
pub struct LazyItem<T> {
    inner: Arc<LazyInner<T>>,
}

impl<T: Send + Sync + 'static> LazyItem<T> {
    pub fn new<F>(init: F) -> Self
    where
        F: FnOnce() -> Option<T> + Send + 'static,
    {
        Self {
            inner: Arc::new(LazyInner {
                cell: OnceLock::new(),
                init: Mutex::new(Some(Box::new(init))),
            }),
        }
    }

    pub fn ready(value: T) -> Self {
        Self::resolved(Some(value))
    }

    pub fn empty() -> Self {
        Self::resolved(None)
    }

    fn resolved(value: Option<T>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(value);
        Self {
            inner: Arc::new(LazyInner {
                cell,
                init: Mutex::new(None),
            }),
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.inner
            .cell
            .get_or_init(|| {
                let init = lock(&self.inner.init, "lazy item").take();
                init.and_then(|f| f())
            })
            .as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.cell.get().is_some()
    }

    /// Lazily maps the item. `f` runs at most once, on first access.
    pub fn map<U, F>(&self, f: F) -> LazyItem<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&T) -> U + Send + 'static,
    {
        let source = self.clone();
        LazyItem::new(move || source.get().map(f))
    }
}

impl<T> Clone for LazyItem<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for LazyItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.cell.get() {
            Some(value) => f.debug_tuple("LazyItem").field(value).finish(),
            None => f.write_str("LazyItem(<pending>)"),
        }
    }
}

/// A change reported by a data source.
pub struct ChangeEvent<T> {
    kind: ChangeKind,
    key: String,
    previous_key: Option<String>,
    item: LazyItem<T>,
}

impl<T: Send + Sync + 'static> ChangeEvent<T> {
    pub fn new(kind: ChangeKind, key: impl Into<String>, item: LazyItem<T>) -> Self {
        Self {
            kind,
            key: key.into(),
            previous_key: None,
            item,
        }
    }

    pub fn moved(
        key: impl Into<String>,
        previous_key: impl Into<String>,
        item: LazyItem<T>,
    ) -> Self {
        Self {
            kind: ChangeKind::Moved,
            key: key.into(),
            previous_key: Some(previous_key.into()),
            item,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn previous_key(&self) -> Option<&str> {
        self.previous_key.as_deref()
    }

    /// The affected item, resolved on first access. Removed events carry the
    /// item as it was before removal, when it was known.
    pub fn item(&self) -> Option<&T> {
        self.item.get()
    }

    pub fn lazy_item(&self) -> &LazyItem<T> {
        &self.item
    }

    pub fn map<U, F>(&self, f: F) -> ChangeEvent<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&T) -> U + Send + 'static,
    {
        ChangeEvent {
            kind: self.kind,
            key: self.key.clone(),
            previous_key: self.previous_key.clone(),
            item: self.item.map(f),
        }
    }
}

impl<T> Clone for ChangeEvent<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            key: self.key.clone(),
            previous_key: self.previous_key.clone(),
            item: self.item.clone(),
        }
    }
}

impl<T> fmt::Debug for ChangeEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeEvent")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("previous_key", &self.previous_key)
            .finish_non_exhaustive()
    }
}

/// Items a data source can hold.
pub trait SourceItem: UniquelyIdentifiable + Clone + Send + Sync + 'static {}

impl<T: UniquelyIdentifiable + Clone + Send + Sync + 'static> SourceItem for T {}

pub type ChangeObserver<T> = Arc<dyn Fn(&ChangeEvent<T>) + Send + Sync>;

pub type BoxedDataSource<T> = Box<dyn DataSource<T>>;

/// An enumerable, change-notifying collection of items.
pub trait DataSource<T>: Send + Sync {
    fn name(&self) -> String;

    fn count(&self) -> usize;

    /// Point-in-time snapshot of the items.
    fn items(&self) -> Vec<T>;

    /// Nested sources. May be recomputed on every call.
    fn sub_sources(&self) -> Result<Vec<BoxedDataSource<T>>>;

    fn subscribe(&self, observer: ChangeObserver<T>) -> Subscription;

    /// Releases resources. Idempotent; no events are raised afterwards.
    fn dispose(&self) -> Result<()>;
}

impl<T, S> DataSource<T> for Arc<S>
where
    S: DataSource<T> + ?Sized,
{
    fn name(&self) -> String {
        (**self).name()
    }

    fn count(&self) -> usize {
        (**self).count()
    }

    fn items(&self) -> Vec<T> {
        (**self).items()
    }

    fn sub_sources(&self) -> Result<Vec<BoxedDataSource<T>>> {
        (**self).sub_sources()
    }

    fn subscribe(&self, observer: ChangeObserver<T>) -> Subscription {
        (**self).subscribe(observer)
    }

    fn dispose(&self) -> Result<()> {
        (**self).dispose()
    }
}

/// Builds data sources from a verified configuration.
pub trait DataSourceFactory<T>: Configurable {
    fn make_data_source(&self, config: &BoundConfiguration) -> Result<BoxedDataSource<T>>;

    /// Binds `bindings` against [`Configurable::requirements`] and builds.
    fn create(&self, bindings: &Bindings) -> Result<BoxedDataSource<T>> {
        let config = self.configure(bindings)?;
        self.make_data_source(&config)
    }
}

pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("{} lock was poisoned, recovering", what);
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_lazy_item_initializes_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let item = {
            let calls = Arc::clone(&calls);
            LazyItem::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Some(5_u32)
            })
        };
        let clone = item.clone();

        assert!(!item.is_resolved());
        assert_eq!(item.get(), Some(&5));
        assert_eq!(clone.get(), Some(&5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lazy_item_map_is_deferred() {
        let calls = Arc::new(AtomicUsize::new(0));
        let item = LazyItem::ready(2_u32);
        let mapped = {
            let calls = Arc::clone(&calls);
            item.map(move |v| {
                calls.fetch_add(1, Ordering::SeqCst);
                v * 10
            })
        };

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(mapped.get(), Some(&20));
        assert_eq!(mapped.get(), Some(&20));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_lazy_item_maps_to_empty() {
        let item = LazyItem::<u32>::empty();
        assert!(item.map(|v| *v + 1).get().is_none());
    }

    #[test]
    fn test_change_event_map_keeps_keys() {
        let event = ChangeEvent::moved("/new", "/old", LazyItem::ready(1_u8));
        let mapped = event.map(|v| v.to_string());

        assert_eq!(mapped.kind(), ChangeKind::Moved);
        assert_eq!(mapped.key(), "/new");
        assert_eq!(mapped.previous_key(), Some("/old"));
        assert_eq!(mapped.item().map(String::as_str), Some("1"));
    }

    #[test]
    fn test_change_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ChangeKind::Removed).unwrap(),
            "\"removed\""
        );
        assert_eq!(ChangeKind::Moved.to_string(), "moved");
    }
}
