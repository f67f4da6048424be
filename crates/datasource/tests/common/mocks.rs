//! Scripted collaborators for folder sources.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use datasource::error::{DataSourceError, Result};
use datasource::folder::{
    DirectoryInteractor, DirectoryInteractorFactory, FileEntry, FileEntryFactory, FolderChange,
    FolderCollaborators, FolderObserver, FolderWatcher, FolderWatcherFactory, SearchPattern,
    WatchChannels,
};
use datasource::identity::FilePath;
use datasource::source::{ChangeKind, LazyItem, Subscription};

/// Directory listings served from memory. Unknown directories are empty.
#[derive(Default)]
pub struct MockDirectoryInteractor {
    files: Mutex<HashMap<FilePath, Vec<FilePath>>>,
    directories: Mutex<HashMap<FilePath, Vec<FilePath>>>,
    failing: Mutex<HashSet<FilePath>>,
    file_calls: AtomicUsize,
}

impl MockDirectoryInteractor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_files(&self, dir: &FilePath, names: &[&str]) {
        let mut files = self.files.lock().unwrap();
        let listing = files.entry(dir.clone()).or_default();
        listing.extend(names.iter().map(|name| dir.join(name)));
    }

    pub fn add_directories(&self, dir: &FilePath, names: &[&str]) {
        let mut directories = self.directories.lock().unwrap();
        let listing = directories.entry(dir.clone()).or_default();
        listing.extend(names.iter().map(|name| dir.join(name)));
    }

    /// Makes every enumeration of `dir` fail.
    pub fn fail(&self, dir: &FilePath) {
        self.failing.lock().unwrap().insert(dir.clone());
    }

    pub fn file_calls(&self) -> usize {
        self.file_calls.load(Ordering::SeqCst)
    }

    fn listing(
        &self,
        table: &Mutex<HashMap<FilePath, Vec<FilePath>>>,
        path: &FilePath,
        pattern: Option<&SearchPattern>,
    ) -> Result<Vec<FilePath>> {
        if self.failing.lock().unwrap().contains(path) {
            return Err(DataSourceError::Enumerate {
                path: path.as_path().to_path_buf(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "scripted failure"),
            });
        }

        let matcher = pattern.map(SearchPattern::compile).transpose()?;
        let listing = table.lock().unwrap().get(path).cloned().unwrap_or_default();
        Ok(listing
            .into_iter()
            .filter(|p| matcher.as_ref().map_or(true, |m| m.matches(&p.file_name())))
            .collect())
    }
}

impl DirectoryInteractor for MockDirectoryInteractor {
    fn enumerate_files(
        &self,
        path: &FilePath,
        pattern: Option<&SearchPattern>,
    ) -> Result<Vec<FilePath>> {
        self.file_calls.fetch_add(1, Ordering::SeqCst);
        self.listing(&self.files, path, pattern)
    }

    fn enumerate_directories(
        &self,
        path: &FilePath,
        pattern: Option<&SearchPattern>,
    ) -> Result<Vec<FilePath>> {
        self.listing(&self.directories, path, pattern)
    }
}

pub struct MockInteractorFactory(pub Arc<MockDirectoryInteractor>);

impl DirectoryInteractorFactory for MockInteractorFactory {
    fn make_interactor(&self) -> Arc<dyn DirectoryInteractor> {
        Arc::clone(&self.0) as Arc<dyn DirectoryInteractor>
    }
}

/// Entries whose content is their own path, so distinct paths digest
/// differently.
#[derive(Default)]
pub struct InMemoryEntryFactory {
    made: AtomicUsize,
}

impl InMemoryEntryFactory {
    pub fn made(&self) -> usize {
        self.made.load(Ordering::SeqCst)
    }
}

impl FileEntryFactory for InMemoryEntryFactory {
    fn from_path(&self, path: &FilePath) -> FileEntry {
        self.made.fetch_add(1, Ordering::SeqCst);
        FileEntry::in_memory(path.clone(), path.to_string().into_bytes())
    }
}

/// A watcher driven by the test instead of the operating system.
pub struct ManualWatcher {
    pub root: FilePath,
    channels: WatchChannels,
    entries: Arc<dyn FileEntryFactory>,
    enabled: AtomicBool,
    disposed: AtomicBool,
    dispose_calls: AtomicUsize,
}

impl ManualWatcher {
    fn new(root: FilePath, entries: Arc<dyn FileEntryFactory>) -> Self {
        Self {
            root,
            channels: WatchChannels::new(),
            entries,
            enabled: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            dispose_calls: AtomicUsize::new(0),
        }
    }

    fn lazy_entry(&self, path: &FilePath) -> LazyItem<FileEntry> {
        let entries = Arc::clone(&self.entries);
        let path = path.clone();
        LazyItem::new(move || Some(entries.from_path(&path)))
    }

    fn raise(&self, change: FolderChange) {
        if self.enabled.load(Ordering::SeqCst) && !self.disposed.load(Ordering::SeqCst) {
            self.channels.raise(&change);
        }
    }

    pub fn path(&self, name: &str) -> FilePath {
        self.root.join(name)
    }

    pub fn add(&self, name: &str) {
        let path = self.path(name);
        let entry = self.lazy_entry(&path);
        self.raise(FolderChange::new(ChangeKind::Added, path, entry));
    }

    pub fn change(&self, name: &str) {
        let path = self.path(name);
        let entry = self.lazy_entry(&path);
        self.raise(FolderChange::new(ChangeKind::Changed, path, entry));
    }

    pub fn remove(&self, name: &str) {
        self.raise(FolderChange::new(
            ChangeKind::Removed,
            self.path(name),
            LazyItem::empty(),
        ));
    }

    pub fn rename(&self, from: &str, to: &str) {
        let path = self.path(to);
        let entry = self.lazy_entry(&path);
        self.raise(FolderChange::moved(path, self.path(from), entry));
    }

    /// Raises `change` on the channels even when disabled or disposed.
    pub fn force(&self, change: &FolderChange) {
        self.channels.raise(change);
    }

    pub fn observer_count(&self) -> usize {
        self.channels.observer_count()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn dispose_calls(&self) -> usize {
        self.dispose_calls.load(Ordering::SeqCst)
    }
}

struct WatcherHandle(Arc<ManualWatcher>);

impl FolderWatcher for WatcherHandle {
    fn subscribe(&self, kind: ChangeKind, observer: FolderObserver) -> Subscription {
        self.0.channels.subscribe(kind, observer)
    }

    fn set_enabled(&self, enabled: bool) {
        self.0.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.0.enabled.load(Ordering::SeqCst)
    }

    fn dispose(&self) -> Result<()> {
        self.0.dispose_calls.fetch_add(1, Ordering::SeqCst);
        if !self.0.disposed.swap(true, Ordering::SeqCst) {
            self.0.enabled.store(false, Ordering::SeqCst);
            self.0.channels.clear();
        }
        Ok(())
    }
}

/// Hands out [`ManualWatcher`]s and remembers them by root.
#[derive(Default)]
pub struct ManualWatcherFactory {
    made: Mutex<Vec<Arc<ManualWatcher>>>,
    failing: Mutex<HashSet<FilePath>>,
}

impl ManualWatcherFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The most recent watcher made for `root`.
    pub fn watcher(&self, root: &FilePath) -> Arc<ManualWatcher> {
        self.made
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|w| &w.root == root)
            .cloned()
            .unwrap_or_else(|| panic!("no watcher made for {}", root))
    }

    pub fn made(&self) -> Vec<Arc<ManualWatcher>> {
        self.made.lock().unwrap().clone()
    }

    /// Makes watcher creation for `root` fail.
    pub fn fail(&self, root: &FilePath) {
        self.failing.lock().unwrap().insert(root.clone());
    }
}

impl FolderWatcherFactory for ManualWatcherFactory {
    fn make_watcher(
        &self,
        root: &FilePath,
        entries: Arc<dyn FileEntryFactory>,
    ) -> Result<Box<dyn FolderWatcher>> {
        if self.failing.lock().unwrap().contains(root) {
            return Err(DataSourceError::Enumerate {
                path: root.as_path().to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "scripted watch failure"),
            });
        }

        let watcher = Arc::new(ManualWatcher::new(root.clone(), entries));
        self.made.lock().unwrap().push(Arc::clone(&watcher));
        Ok(Box::new(WatcherHandle(watcher)))
    }
}

/// Mocks wired together, plus the collaborators to hand to a folder source.
pub struct Scripted {
    pub interactor: Arc<MockDirectoryInteractor>,
    pub watchers: Arc<ManualWatcherFactory>,
    pub entries: Arc<InMemoryEntryFactory>,
}

impl Scripted {
    pub fn new() -> Self {
        Self {
            interactor: MockDirectoryInteractor::new(),
            watchers: ManualWatcherFactory::new(),
            entries: Arc::new(InMemoryEntryFactory::default()),
        }
    }

    pub fn collaborators(&self) -> FolderCollaborators {
        FolderCollaborators {
            interactors: Arc::new(MockInteractorFactory(Arc::clone(&self.interactor))),
            watchers: Arc::clone(&self.watchers) as Arc<dyn FolderWatcherFactory>,
            entries: Arc::clone(&self.entries) as Arc<dyn FileEntryFactory>,
        }
    }
}
