use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::{debug, info};

use crate::error::Result;
use crate::source::{
    lock, BoxedDataSource, ChangeEvent, ChangeObserver, DataSource, Observers, SourceItem,
    Subscription,
};

pub type ItemMap<F, T> = Arc<dyn Fn(&F) -> T + Send + Sync>;
pub type EventMap<F, T> = Arc<dyn Fn(&ChangeEvent<F>) -> ChangeEvent<T> + Send + Sync>;
pub type SubSourceMap<F, T> = Arc<dyn Fn(BoxedDataSource<F>) -> BoxedDataSource<T> + Send + Sync>;
pub type NameFactory = Arc<dyn Fn(&str) -> String + Send + Sync>;

struct TransformShared<T> {
    memo: Mutex<Option<Arc<Vec<T>>>>,
    observers: Observers<ChangeEvent<T>>,
}

/// A read-only view of an upstream source with every item mapped into
/// another identifiable item.
///
/// Mapped items are computed on first enumeration and memoized as one
/// snapshot. Any upstream event drops the snapshot before the mapped event
/// is raised, so observers that enumerate from inside their callback see the
/// new state. An enumeration never mixes items from two snapshots.
pub struct TransformDataSource<F, T> {
    upstream: BoxedDataSource<F>,
    shared: Arc<TransformShared<T>>,
    item_map: ItemMap<F, T>,
    sub_source_map: SubSourceMap<F, T>,
    name_factory: Option<NameFactory>,
    upstream_subscription: Mutex<Option<Subscription>>,
    disposed: AtomicBool,
}

impl<F, T> TransformDataSource<F, T>
where
    F: Send + Sync + 'static,
    T: SourceItem,
{
    pub fn new(
        upstream: BoxedDataSource<F>,
        item_map: ItemMap<F, T>,
        event_map: EventMap<F, T>,
        sub_source_map: SubSourceMap<F, T>,
        name_factory: Option<NameFactory>,
    ) -> Self {
        let shared = Arc::new(TransformShared {
            memo: Mutex::new(None),
            observers: Observers::new(),
        });

        let weak: Weak<TransformShared<T>> = Arc::downgrade(&shared);
        let handler: ChangeObserver<F> = Arc::new(move |event: &ChangeEvent<F>| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            lock(&shared.memo, "transform memo").take();
            shared.observers.notify(&event_map(event));
        });
        let upstream_subscription = upstream.subscribe(handler);

        Self {
            upstream,
            shared,
            item_map,
            sub_source_map,
            name_factory,
            upstream_subscription: Mutex::new(Some(upstream_subscription)),
            disposed: AtomicBool::new(false),
        }
    }

    /// Maps items, events and sub-sources (recursively) with one function.
    pub fn mapping<M>(upstream: BoxedDataSource<F>, map: M) -> Self
    where
        M: Fn(&F) -> T + Send + Sync + 'static,
    {
        Self::mapping_with(upstream, Arc::new(map), None)
    }

    pub fn mapping_with(
        upstream: BoxedDataSource<F>,
        item_map: ItemMap<F, T>,
        name_factory: Option<NameFactory>,
    ) -> Self {
        let event_map: EventMap<F, T> = {
            let item_map = Arc::clone(&item_map);
            Arc::new(move |event: &ChangeEvent<F>| {
                let item_map = Arc::clone(&item_map);
                event.map(move |item| item_map(item))
            })
        };

        let sub_source_map: SubSourceMap<F, T> = {
            let item_map = Arc::clone(&item_map);
            let name_factory = name_factory.clone();
            Arc::new(move |source: BoxedDataSource<F>| {
                Box::new(TransformDataSource::mapping_with(
                    source,
                    Arc::clone(&item_map),
                    name_factory.clone(),
                )) as BoxedDataSource<T>
            })
        };

        Self::new(upstream, item_map, event_map, sub_source_map, name_factory)
    }

    /// The memoized mapped items, computing them if needed.
    pub fn snapshot(&self) -> Arc<Vec<T>> {
        let mut memo = lock(&self.shared.memo, "transform memo");
        if let Some(items) = memo.as_ref() {
            return Arc::clone(items);
        }

        let items: Arc<Vec<T>> = Arc::new(
            self.upstream
                .items()
                .iter()
                .map(|item| (self.item_map)(item))
                .collect(),
        );
        debug!(
            "'{}': recomputed {} mapped items",
            self.upstream.name(),
            items.len()
        );
        *memo = Some(Arc::clone(&items));
        items
    }

    pub fn upstream(&self) -> &dyn DataSource<F> {
        self.upstream.as_ref()
    }
}

impl<F, T> DataSource<T> for TransformDataSource<F, T>
where
    F: Send + Sync + 'static,
    T: SourceItem,
{
    fn name(&self) -> String {
        let upstream = self.upstream.name();
        match &self.name_factory {
            Some(factory) => factory(&upstream),
            None => upstream,
        }
    }

    fn count(&self) -> usize {
        self.snapshot().len()
    }

    fn items(&self) -> Vec<T> {
        self.snapshot().as_ref().clone()
    }

    fn sub_sources(&self) -> Result<Vec<BoxedDataSource<T>>> {
        Ok(self
            .upstream
            .sub_sources()?
            .into_iter()
            .map(|source| (self.sub_source_map)(source))
            .collect())
    }

    fn subscribe(&self, observer: ChangeObserver<T>) -> Subscription {
        if self.disposed.load(Ordering::SeqCst) {
            return Subscription::empty();
        }
        self.shared.observers.register_arc(observer)
    }

    fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        lock(&self.upstream_subscription, "transform subscription").take();
        self.shared.observers.clear();
        lock(&self.shared.memo, "transform memo").take();

        info!("Disposed transform over '{}'", self.upstream.name());
        self.upstream.dispose()
    }
}
