//! Sources with scripted disposal, for tests in this module.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{DataSourceError, Result};
use crate::source::{BoxedDataSource, ChangeObserver, DataSource, SourceItem, Subscription};

/// An empty source that counts `dispose` calls and can refuse them.
pub(crate) struct DisposeCounter {
    name: &'static str,
    refuse: bool,
    calls: Arc<AtomicUsize>,
}

impl DisposeCounter {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            refuse: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn refusing(name: &'static str) -> Self {
        Self {
            refuse: true,
            ..Self::new(name)
        }
    }

    /// Shared handle on the number of `dispose` calls.
    pub(crate) fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl<T: SourceItem> DataSource<T> for DisposeCounter {
    fn name(&self) -> String {
        self.name.to_string()
    }

    fn count(&self) -> usize {
        0
    }

    fn items(&self) -> Vec<T> {
        Vec::new()
    }

    fn sub_sources(&self) -> Result<Vec<BoxedDataSource<T>>> {
        Ok(Vec::new())
    }

    fn subscribe(&self, _observer: ChangeObserver<T>) -> Subscription {
        Subscription::empty()
    }

    fn dispose(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(DataSourceError::Bindings {
                message: format!("{} refused to dispose", self.name),
            });
        }
        Ok(())
    }
}
