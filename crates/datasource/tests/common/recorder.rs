//! Captures change events for assertions.

use std::sync::{Arc, Mutex};

use datasource::source::{ChangeEvent, ChangeKind, ChangeObserver};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub kind: ChangeKind,
    pub key: String,
    pub previous_key: Option<String>,
    pub has_item: bool,
}

#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Recorded>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// An observer appending to this recorder. Items are resolved eagerly.
    pub fn observer<T: Send + Sync + 'static>(&self) -> ChangeObserver<T> {
        let events = Arc::clone(&self.events);
        Arc::new(move |event: &ChangeEvent<T>| {
            events.lock().unwrap().push(Recorded {
                kind: event.kind(),
                key: event.key().to_string(),
                previous_key: event.previous_key().map(str::to_string),
                has_item: event.item().is_some(),
            });
        })
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, kind: ChangeKind) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}
