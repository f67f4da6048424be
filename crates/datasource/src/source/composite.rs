use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::error::{DataSourceError, Result};
use crate::source::{
    lock, BoxedDataSource, ChangeEvent, ChangeObserver, DataSource, Observers, SourceItem,
    Subscription,
};

/// Presents several sources as one.
///
/// Child events are forwarded unchanged. Enumeration concatenates children in
/// the order they were given.
pub struct CompositeDataSource<T> {
    name: String,
    children: Vec<BoxedDataSource<T>>,
    observers: Observers<ChangeEvent<T>>,
    forwards: Mutex<Vec<Subscription>>,
    disposed: AtomicBool,
}

impl<T: SourceItem> CompositeDataSource<T> {
    pub fn new(name: impl Into<String>, children: Vec<BoxedDataSource<T>>) -> Self {
        let observers: Observers<ChangeEvent<T>> = Observers::new();

        let forwards = children
            .iter()
            .map(|child| {
                let observers = observers.clone();
                let forward: ChangeObserver<T> = Arc::new(move |event: &ChangeEvent<T>| {
                    observers.notify(event)
                });
                child.subscribe(forward)
            })
            .collect();

        let name = name.into();
        debug!("Composite '{}' created over {} children", name, children.len());

        Self {
            name,
            children,
            observers,
            forwards: Mutex::new(forwards),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn children(&self) -> &[BoxedDataSource<T>] {
        &self.children
    }
}

impl<T: SourceItem> DataSource<T> for CompositeDataSource<T> {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn count(&self) -> usize {
        self.children.iter().map(|c| c.count()).sum()
    }

    fn items(&self) -> Vec<T> {
        self.children.iter().flat_map(|c| c.items()).collect()
    }

    fn sub_sources(&self) -> Result<Vec<BoxedDataSource<T>>> {
        let mut all = Vec::new();
        for child in &self.children {
            all.extend(child.sub_sources()?);
        }
        Ok(all)
    }

    fn subscribe(&self, observer: ChangeObserver<T>) -> Subscription {
        if self.disposed.load(Ordering::SeqCst) {
            return Subscription::empty();
        }
        self.observers.register_arc(observer)
    }

    fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        lock(&self.forwards, "composite forwards").clear();
        self.observers.clear();

        let errors: Vec<DataSourceError> = self
            .children
            .iter()
            .filter_map(|child| child.dispose().err())
            .collect();

        info!("Disposed composite '{}'", self.name);

        if errors.is_empty() {
            Ok(())
        } else {
            warn!(
                "Composite '{}': {} child(ren) failed to dispose",
                self.name,
                errors.len()
            );
            Err(DataSourceError::Aggregate(errors))
        }
    }
}
