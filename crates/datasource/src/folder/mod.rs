//! A data source backed by a directory on disk.
//!
//! [`FolderDataSource`] keeps an index of the files directly inside its root
//! and keeps it current from a [`FolderWatcher`]. Enumeration, watching and
//! entry construction are pluggable through factories; the defaults use
//! walkdir, notify and the local file system.

pub mod entry;
pub mod factory;
pub mod interactor;
pub mod source;
pub mod watcher;

pub use entry::{
    ContentDigest, DigestState, FileEntry, FileEntryFactory, LocalFileEntryFactory, Opener,
};
pub use factory::FolderDataSourceFactory;
pub use interactor::{
    DirectoryInteractor, DirectoryInteractorFactory, LocalDirectoryInteractor,
    LocalDirectoryInteractorFactory, SearchOption, SearchPattern,
};
pub use source::{FolderCollaborators, FolderDataSource, FolderOptions};
pub use watcher::{
    FolderChange, FolderObserver, FolderWatcher, FolderWatcherFactory, NotifyFolderWatcher,
    NotifyWatcherFactory, WatchChannels,
};
