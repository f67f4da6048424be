use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use log::{debug, info, warn};

use crate::error::Result;
use crate::folder::entry::{FileEntry, FileEntryFactory, LocalFileEntryFactory};
use crate::folder::interactor::{
    DirectoryInteractor, DirectoryInteractorFactory, LocalDirectoryInteractorFactory,
    SearchPattern,
};
use crate::folder::watcher::{
    FolderChange, FolderObserver, FolderWatcher, FolderWatcherFactory, NotifyWatcherFactory,
};
use crate::identity::FilePath;
use crate::source::{
    lock, BoxedDataSource, ChangeEvent, ChangeKind, ChangeObserver, DataSource, LazyItem,
    Observers, Subscription,
};

/// The factories a folder source builds its helpers from. Shared with every
/// sub-source.
#[derive(Clone)]
pub struct FolderCollaborators {
    pub interactors: Arc<dyn DirectoryInteractorFactory>,
    pub watchers: Arc<dyn FolderWatcherFactory>,
    pub entries: Arc<dyn FileEntryFactory>,
}

impl Default for FolderCollaborators {
    fn default() -> Self {
        Self {
            interactors: Arc::new(LocalDirectoryInteractorFactory),
            watchers: Arc::new(NotifyWatcherFactory::new()),
            entries: Arc::new(LocalFileEntryFactory),
        }
    }
}

impl fmt::Debug for FolderCollaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FolderCollaborators").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FolderOptions {
    /// Restricts enumeration to matching file names. Subdirectories are
    /// always listed; the filter carries over to their sources.
    pub filter: Option<SearchPattern>,
    /// Keep dot-files and dot-directories.
    pub include_hidden: bool,
}

impl FolderOptions {
    fn admits(&self, path: &FilePath) -> bool {
        self.include_hidden || !path.file_name().starts_with('.')
    }
}

struct FolderState {
    files: HashMap<FilePath, FileEntry>,
    disposed: bool,
}

struct FolderShared {
    root: FilePath,
    state: Mutex<FolderState>,
    observers: Observers<ChangeEvent<FileEntry>>,
}

impl FolderShared {
    /// Applies one watcher notification to the index and re-raises it.
    fn apply(&self, change: &FolderChange) {
        let path = change.path();
        let key = path.to_string();
        // Resolve outside the lock; this may touch the file system.
        let entry = match change.kind() {
            ChangeKind::Removed => None,
            _ => change.entry().cloned(),
        };

        let event = {
            let mut state = lock(&self.state, "folder index");
            if state.disposed {
                return;
            }

            match change.kind() {
                ChangeKind::Added => {
                    match entry {
                        Some(entry) => {
                            if state.files.insert(path.clone(), entry).is_some() {
                                warn!("{}: duplicate add for {}, replacing", self.root, path);
                            }
                        }
                        None => warn!("{}: added {} without an entry", self.root, path),
                    }
                    ChangeEvent::new(ChangeKind::Added, key, change.lazy_entry().clone())
                }
                ChangeKind::Changed => {
                    match entry {
                        Some(entry) => {
                            if state.files.insert(path.clone(), entry).is_none() {
                                debug!("{}: change for unknown {}, adding", self.root, path);
                            }
                        }
                        None => warn!("{}: changed {} without an entry", self.root, path),
                    }
                    ChangeEvent::new(ChangeKind::Changed, key, change.lazy_entry().clone())
                }
                ChangeKind::Removed => {
                    let item = match state.files.remove(path) {
                        Some(old) => LazyItem::ready(old),
                        None => {
                            debug!("{}: remove of unknown {}", self.root, path);
                            change.lazy_entry().clone()
                        }
                    };
                    ChangeEvent::new(ChangeKind::Removed, key, item)
                }
                ChangeKind::Moved => {
                    let previous = change.previous_path();
                    if let Some(previous) = previous {
                        state.files.remove(previous);
                    }
                    // Moved entries start fresh; nothing carries over.
                    match entry {
                        Some(entry) => {
                            state.files.insert(path.clone(), entry);
                        }
                        None => warn!("{}: moved {} without an entry", self.root, path),
                    }
                    match previous {
                        Some(previous) => ChangeEvent::moved(
                            key,
                            previous.to_string(),
                            change.lazy_entry().clone(),
                        ),
                        None => {
                            ChangeEvent::new(ChangeKind::Moved, key, change.lazy_entry().clone())
                        }
                    }
                }
            }
        };

        debug!("{}: {} {}", self.root, event.kind(), event.key());
        self.observers.notify(&event);
    }
}

/// A data source over the files directly inside one directory.
///
/// Subdirectories are exposed as sub-sources, built fresh on every call.
///
/// The watcher is enabled before the initial enumeration, so a file created
/// during construction may be reported both by the enumeration and by an
/// `Added` event. Entries delivered by the watcher first are kept.
pub struct FolderDataSource {
    shared: Arc<FolderShared>,
    interactor: Arc<dyn DirectoryInteractor>,
    collaborators: FolderCollaborators,
    options: FolderOptions,
    watcher: Mutex<Option<Box<dyn FolderWatcher>>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl FolderDataSource {
    pub fn open(root: impl Into<FilePath>) -> Result<Self> {
        Self::new(root, FolderCollaborators::default(), FolderOptions::default())
    }

    pub fn new(
        root: impl Into<FilePath>,
        collaborators: FolderCollaborators,
        options: FolderOptions,
    ) -> Result<Self> {
        let root = root.into();
        let _span = tracing::info_span!("folder_source.open", root = %root).entered();

        let interactor = collaborators.interactors.make_interactor();
        let watcher = collaborators
            .watchers
            .make_watcher(&root, Arc::clone(&collaborators.entries))?;

        let shared = Arc::new(FolderShared {
            root: root.clone(),
            state: Mutex::new(FolderState {
                files: HashMap::new(),
                disposed: false,
            }),
            observers: Observers::new(),
        });

        let subscriptions: Vec<Subscription> = ChangeKind::ALL
            .iter()
            .map(|kind| {
                let weak: Weak<FolderShared> = Arc::downgrade(&shared);
                let observer: FolderObserver = Arc::new(move |change: &FolderChange| {
                    if let Some(shared) = weak.upgrade() {
                        shared.apply(change);
                    }
                });
                watcher.subscribe(*kind, observer)
            })
            .collect();

        watcher.set_enabled(true);

        let files = match interactor.enumerate_files(&root, options.filter.as_ref()) {
            Ok(files) => files,
            Err(e) => {
                drop(subscriptions);
                if let Err(dispose_err) = watcher.dispose() {
                    warn!("{}: watcher dispose failed: {}", root, dispose_err);
                }
                return Err(e);
            }
        };

        let count = {
            let mut state = lock(&shared.state, "folder index");
            for path in files.into_iter().filter(|p| options.admits(p)) {
                let entries = &collaborators.entries;
                state
                    .files
                    .entry(path)
                    .or_insert_with_key(|path| entries.from_path(path));
            }
            state.files.len()
        };

        info!("Opened folder source {} with {} files", root, count);

        Ok(Self {
            shared,
            interactor,
            collaborators,
            options,
            watcher: Mutex::new(Some(watcher)),
            subscriptions: Mutex::new(subscriptions),
        })
    }

    pub fn root(&self) -> &FilePath {
        &self.shared.root
    }

    pub fn get(&self, path: &FilePath) -> Option<FileEntry> {
        lock(&self.shared.state, "folder index")
            .files
            .get(path)
            .cloned()
    }

    pub fn contains(&self, path: &FilePath) -> bool {
        lock(&self.shared.state, "folder index")
            .files
            .contains_key(path)
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.shared.state, "folder index").disposed
    }
}

impl DataSource<FileEntry> for FolderDataSource {
    fn name(&self) -> String {
        self.shared.root.to_string()
    }

    fn count(&self) -> usize {
        lock(&self.shared.state, "folder index").files.len()
    }

    /// Entries sorted by path.
    fn items(&self) -> Vec<FileEntry> {
        let mut items: Vec<FileEntry> = lock(&self.shared.state, "folder index")
            .files
            .values()
            .cloned()
            .collect();
        items.sort_by(|a, b| a.path().cmp(b.path()));
        items
    }

    fn sub_sources(&self) -> Result<Vec<BoxedDataSource<FileEntry>>> {
        let directories = self
            .interactor
            .enumerate_directories(&self.shared.root, None)?;

        directories
            .into_iter()
            .filter(|dir| self.options.admits(dir))
            .map(|dir| {
                FolderDataSource::new(dir, self.collaborators.clone(), self.options.clone())
                    .map(|source| Box::new(source) as BoxedDataSource<FileEntry>)
            })
            .collect()
    }

    fn subscribe(&self, observer: ChangeObserver<FileEntry>) -> Subscription {
        if self.is_disposed() {
            return Subscription::empty();
        }
        self.shared.observers.register_arc(observer)
    }

    fn dispose(&self) -> Result<()> {
        {
            let mut state = lock(&self.shared.state, "folder index");
            if state.disposed {
                return Ok(());
            }
            state.disposed = true;
        }

        self.shared.observers.clear();
        lock(&self.subscriptions, "folder subscriptions").clear();

        let watcher = lock(&self.watcher, "folder watcher").take();
        let result = match watcher {
            Some(watcher) => watcher.dispose(),
            None => Ok(()),
        };

        info!("Disposed folder source {}", self.shared.root);
        result
    }
}

impl Drop for FolderDataSource {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            warn!("{}: dispose on drop failed: {}", self.shared.root, e);
        }
    }
}

impl fmt::Debug for FolderDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FolderDataSource")
            .field("root", &self.shared.root)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
