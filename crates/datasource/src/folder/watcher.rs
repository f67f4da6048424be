//! Change notification for a watched folder.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::{DataSourceError, Result};
use crate::folder::entry::{FileEntry, FileEntryFactory};
use crate::folder::interactor::SearchPattern;
use crate::identity::FilePath;
use crate::source::{lock, ChangeKind, LazyItem, Observers, Subscription};

/// A single notification from a folder watcher.
#[derive(Clone)]
pub struct FolderChange {
    kind: ChangeKind,
    path: FilePath,
    previous_path: Option<FilePath>,
    entry: LazyItem<FileEntry>,
}

impl FolderChange {
    pub fn new(kind: ChangeKind, path: impl Into<FilePath>, entry: LazyItem<FileEntry>) -> Self {
        Self {
            kind,
            path: path.into(),
            previous_path: None,
            entry,
        }
    }

    pub fn moved(
        path: impl Into<FilePath>,
        previous_path: impl Into<FilePath>,
        entry: LazyItem<FileEntry>,
    ) -> Self {
        Self {
            kind: ChangeKind::Moved,
            path: path.into(),
            previous_path: Some(previous_path.into()),
            entry,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn path(&self) -> &FilePath {
        &self.path
    }

    pub fn previous_path(&self) -> Option<&FilePath> {
        self.previous_path.as_ref()
    }

    /// The entry at [`FolderChange::path`], resolved on first access.
    pub fn entry(&self) -> Option<&FileEntry> {
        self.entry.get()
    }

    pub fn lazy_entry(&self) -> &LazyItem<FileEntry> {
        &self.entry
    }
}

impl fmt::Debug for FolderChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FolderChange")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("previous_path", &self.previous_path)
            .finish_non_exhaustive()
    }
}

pub type FolderObserver = Arc<dyn Fn(&FolderChange) + Send + Sync>;

/// The four subscribe points of a watcher.
#[derive(Debug, Default)]
pub struct WatchChannels {
    added: Observers<FolderChange>,
    changed: Observers<FolderChange>,
    moved: Observers<FolderChange>,
    removed: Observers<FolderChange>,
}

impl WatchChannels {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, kind: ChangeKind) -> &Observers<FolderChange> {
        match kind {
            ChangeKind::Added => &self.added,
            ChangeKind::Changed => &self.changed,
            ChangeKind::Moved => &self.moved,
            ChangeKind::Removed => &self.removed,
        }
    }

    pub fn subscribe(&self, kind: ChangeKind, observer: FolderObserver) -> Subscription {
        self.channel(kind).register_arc(observer)
    }

    /// Delivers `change` to the observers of its kind.
    pub fn raise(&self, change: &FolderChange) {
        self.channel(change.kind()).notify(change);
    }

    pub fn clear(&self) {
        for kind in ChangeKind::ALL {
            self.channel(kind).clear();
        }
    }

    pub fn observer_count(&self) -> usize {
        ChangeKind::ALL
            .iter()
            .map(|kind| self.channel(*kind).len())
            .sum()
    }
}

/// Reports changes under one folder.
///
/// A watcher starts disabled. Notifications observed while disabled or after
/// disposal are dropped.
pub trait FolderWatcher: Send + Sync {
    fn subscribe(&self, kind: ChangeKind, observer: FolderObserver) -> Subscription;

    fn set_enabled(&self, enabled: bool);

    fn is_enabled(&self) -> bool;

    fn dispose(&self) -> Result<()>;
}

pub trait FolderWatcherFactory: Send + Sync {
    fn make_watcher(
        &self,
        root: &FilePath,
        entries: Arc<dyn FileEntryFactory>,
    ) -> Result<Box<dyn FolderWatcher>>;
}

/// Raw classification of a notify event: kind, path and previous path.
pub(crate) fn classify(event: &Event) -> Vec<(ChangeKind, PathBuf, Option<PathBuf>)> {
    let each = |kind: ChangeKind| {
        event
            .paths
            .iter()
            .map(|p| (kind, p.clone(), None))
            .collect::<Vec<_>>()
    };

    match &event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) => each(ChangeKind::Added),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![(ChangeKind::Moved, to.clone(), Some(from.clone()))],
            _ => {
                debug!("Rename event without a path pair: {:?}", event.paths);
                Vec::new()
            }
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => each(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => each(ChangeKind::Added),
        // Platforms that cannot tell the two halves apart.
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    ChangeKind::Added
                } else {
                    ChangeKind::Removed
                };
                (kind, p.clone(), None)
            })
            .collect(),
        EventKind::Modify(_) => each(ChangeKind::Changed),
        EventKind::Remove(RemoveKind::Folder) => Vec::new(),
        EventKind::Remove(_) => each(ChangeKind::Removed),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

struct WatchState {
    root: FilePath,
    enabled: AtomicBool,
    disposed: AtomicBool,
    filter: Option<glob::Pattern>,
    include_hidden: bool,
    change_filter: Duration,
    last_change: Mutex<HashMap<PathBuf, Instant>>,
    /// Rename cookies whose halves were already published.
    published_halves: Mutex<VecDeque<usize>>,
    entries: Arc<dyn FileEntryFactory>,
    channels: WatchChannels,
}

/// Bound on remembered rename cookies. A half whose partner never arrives
/// (a move across the watched folder's boundary) ages out.
const RENAME_COOKIES: usize = 64;

impl WatchState {
    fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        if !self.include_hidden && name.starts_with('.') {
            return false;
        }
        self.filter.as_ref().map_or(true, |p| p.matches(&name))
    }

    /// Drops a `Changed` notification seen again within the change filter.
    fn throttled(&self, path: &Path) -> bool {
        if self.change_filter.is_zero() {
            return false;
        }

        let now = Instant::now();
        let mut last = lock(&self.last_change, "watch throttle");
        match last.get(path) {
            Some(seen) if now.duration_since(*seen) < self.change_filter => true,
            _ => {
                last.insert(path.to_path_buf(), now);
                false
            }
        }
    }

    fn lazy_entry(&self, path: &Path) -> LazyItem<FileEntry> {
        let entries = Arc::clone(&self.entries);
        let path = FilePath::from(path);
        LazyItem::new(move || Some(entries.from_path(&path)))
    }

    /// Some backends (inotify) report a rename as two halves followed by one
    /// paired event. A paired event whose halves were already published is a
    /// duplicate.
    fn duplicate_rename(&self, event: &Event) -> bool {
        let (EventKind::Modify(ModifyKind::Name(mode)), Some(tracker)) =
            (&event.kind, event.tracker())
        else {
            return false;
        };

        let mut halves = lock(&self.published_halves, "rename cookies");
        match mode {
            RenameMode::From | RenameMode::To => {
                if !halves.contains(&tracker) {
                    if halves.len() == RENAME_COOKIES {
                        halves.pop_front();
                    }
                    halves.push_back(tracker);
                }
                false
            }
            RenameMode::Both => match halves.iter().position(|t| *t == tracker) {
                Some(i) => {
                    halves.remove(i);
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    fn handle(&self, event: &Event) {
        if self.disposed.load(Ordering::SeqCst) || !self.enabled.load(Ordering::SeqCst) {
            return;
        }
        if self.duplicate_rename(event) {
            debug!("{}: rename already reported as halves: {:?}", self.root, event.paths);
            return;
        }

        for (kind, path, previous) in classify(event) {
            // Directories are exposed as sub-sources, never as entries.
            if kind != ChangeKind::Removed && path.is_dir() {
                continue;
            }

            let change = match (kind, previous) {
                (ChangeKind::Moved, Some(previous)) => {
                    if !self.accepts(&path) && !self.accepts(&previous) {
                        continue;
                    }
                    lock(&self.last_change, "watch throttle").remove(&previous);
                    FolderChange::moved(path.clone(), previous, self.lazy_entry(&path))
                }
                (ChangeKind::Removed, _) => {
                    if !self.accepts(&path) {
                        continue;
                    }
                    lock(&self.last_change, "watch throttle").remove(&path);
                    FolderChange::new(kind, path, LazyItem::empty())
                }
                _ => {
                    if !self.accepts(&path) {
                        continue;
                    }
                    if kind == ChangeKind::Changed && self.throttled(&path) {
                        continue;
                    }
                    FolderChange::new(kind, path.clone(), self.lazy_entry(&path))
                }
            };

            debug!("{}: {} {}", self.root, change.kind(), change.path());
            self.channels.raise(&change);
        }
    }
}

/// Watches a single folder (not its subdirectories) with the platform's
/// recommended notify backend.
pub struct NotifyFolderWatcher {
    state: Arc<WatchState>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl FolderWatcher for NotifyFolderWatcher {
    fn subscribe(&self, kind: ChangeKind, observer: FolderObserver) -> Subscription {
        self.state.channels.subscribe(kind, observer)
    }

    fn set_enabled(&self, enabled: bool) {
        self.state.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::SeqCst)
    }

    fn dispose(&self) -> Result<()> {
        if self.state.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.state.enabled.store(false, Ordering::SeqCst);
        self.state.channels.clear();

        if let Some(mut watcher) = lock(&self.watcher, "notify watcher").take() {
            if let Err(e) = watcher.unwatch(self.state.root.as_path()) {
                debug!("Unwatch of {} failed: {}", self.state.root, e);
            }
        }

        info!("Stopped watching {}", self.state.root);
        Ok(())
    }
}

impl Drop for NotifyFolderWatcher {
    fn drop(&mut self) {
        let _ = FolderWatcher::dispose(self);
    }
}

/// Builds [`NotifyFolderWatcher`]s.
#[derive(Debug, Clone, Default)]
pub struct NotifyWatcherFactory {
    filter: Option<glob::Pattern>,
    change_filter: Duration,
    include_hidden: bool,
}

impl NotifyWatcherFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only report files whose name matches `pattern`.
    pub fn with_filter(mut self, pattern: &SearchPattern) -> Result<Self> {
        self.filter = Some(pattern.compile()?);
        Ok(self)
    }

    /// Minimum interval between two `Changed` notifications for one path.
    pub fn with_change_filter(mut self, change_filter: Duration) -> Self {
        self.change_filter = change_filter;
        self
    }

    pub fn with_hidden(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }

    fn state(&self, root: &FilePath, entries: Arc<dyn FileEntryFactory>) -> WatchState {
        WatchState {
            root: root.clone(),
            enabled: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            filter: self.filter.clone(),
            include_hidden: self.include_hidden,
            change_filter: self.change_filter,
            last_change: Mutex::new(HashMap::new()),
            published_halves: Mutex::new(VecDeque::new()),
            entries,
            channels: WatchChannels::new(),
        }
    }
}

impl FolderWatcherFactory for NotifyWatcherFactory {
    fn make_watcher(
        &self,
        root: &FilePath,
        entries: Arc<dyn FileEntryFactory>,
    ) -> Result<Box<dyn FolderWatcher>> {
        let state = Arc::new(self.state(root, entries));

        let handler_state = Arc::clone(&state);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => handler_state.handle(&event),
                Err(e) => warn!("Watch error under {}: {}", handler_state.root, e),
            },
            notify::Config::default(),
        )
        .map_err(|e| DataSourceError::Watch {
            path: root.as_path().to_path_buf(),
            source: e,
        })?;

        watcher
            .watch(root.as_path(), RecursiveMode::NonRecursive)
            .map_err(|e| DataSourceError::Watch {
                path: root.as_path().to_path_buf(),
                source: e,
            })?;

        info!("Watching {}", root);
        Ok(Box::new(NotifyFolderWatcher {
            state,
            watcher: Mutex::new(Some(watcher)),
        }))
    }
}
