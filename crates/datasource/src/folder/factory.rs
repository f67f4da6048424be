//! Requirement-driven construction of folder sources.

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use log::debug;

use crate::config::{BoundConfiguration, ConfigValue, Configurable, Requirement};
use crate::error::Result;
use crate::folder::entry::{FileEntry, FileEntryFactory, LocalFileEntryFactory};
use crate::folder::interactor::{
    DirectoryInteractorFactory, LocalDirectoryInteractorFactory, SearchPattern,
};
use crate::folder::source::{FolderCollaborators, FolderDataSource, FolderOptions};
use crate::folder::watcher::{FolderWatcherFactory, NotifyWatcherFactory};
use crate::source::{BoxedDataSource, DataSourceFactory};

pub const ROOT_PATH_NAME: &str = "Root Path";
pub const CHANGE_FILTER_NAME: &str = "Change Filter Millis";
pub const FILTER_NAME_NAME: &str = "Filter Name";
pub const WATCHER_FACTORY_NAME: &str = "FolderDataWatcher Factory";
pub const INTERACTOR_FACTORY_NAME: &str = "DirectoryInteractor Factory";
pub const ENTRY_FACTORY_NAME: &str = "FileEntry Factory";
pub const INCLUDE_HIDDEN_NAME: &str = "Include Hidden";

pub static ROOT_PATH: LazyLock<Requirement> = LazyLock::new(|| {
    Requirement::path(ROOT_PATH_NAME)
        .description("Directory whose files make up the source")
        .validator(|value: &ConfigValue| match value.downcast_ref::<PathBuf>() {
            Some(path) if path.as_os_str().is_empty() => Err("path is empty".to_string()),
            _ => Ok(()),
        })
        .build()
        .unwrap()
});

pub static CHANGE_FILTER_MILLIS: LazyLock<Requirement> = LazyLock::new(|| {
    Requirement::int64(CHANGE_FILTER_NAME)
        .description("Minimum milliseconds between two change notifications for one file")
        .optional()
        .validator(|value: &ConfigValue| match value.downcast_ref::<i64>() {
            Some(millis) if *millis < 0 => Err(format!("must not be negative, got {}", millis)),
            _ => Ok(()),
        })
        .build()
        .unwrap()
});

pub static FILTER_NAME: LazyLock<Requirement> = LazyLock::new(|| {
    Requirement::string(FILTER_NAME_NAME)
        .description("Glob matched against file names")
        .optional()
        .validator(|value: &ConfigValue| match value.downcast_ref::<String>() {
            Some(pattern) => glob::Pattern::new(pattern)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            None => Ok(()),
        })
        .build()
        .unwrap()
});

pub static WATCHER_FACTORY: LazyLock<Requirement> = LazyLock::new(|| {
    Requirement::custom::<Arc<dyn FolderWatcherFactory>>(WATCHER_FACTORY_NAME)
        .description("Builds the watcher for each folder; replaces the default notify watcher")
        .optional()
        .exclusive_with(CHANGE_FILTER_NAME)
        .exclusive_with(FILTER_NAME_NAME)
        .build()
        .unwrap()
});

pub static INTERACTOR_FACTORY: LazyLock<Requirement> = LazyLock::new(|| {
    Requirement::custom::<Arc<dyn DirectoryInteractorFactory>>(INTERACTOR_FACTORY_NAME)
        .description("Builds the directory enumerator")
        .optional()
        .build()
        .unwrap()
});

pub static ENTRY_FACTORY: LazyLock<Requirement> = LazyLock::new(|| {
    Requirement::custom::<Arc<dyn FileEntryFactory>>(ENTRY_FACTORY_NAME)
        .description("Builds file entries from paths")
        .optional()
        .build()
        .unwrap()
});

pub static INCLUDE_HIDDEN: LazyLock<Requirement> = LazyLock::new(|| {
    Requirement::boolean(INCLUDE_HIDDEN_NAME)
        .description("Keep dot-files and dot-directories")
        .optional()
        .build()
        .unwrap()
});

/// Builds [`FolderDataSource`]s from bound requirements.
///
/// Unbound collaborators fall back to the local file system: walkdir
/// enumeration, a notify watcher configured from `Filter Name`,
/// `Change Filter Millis` and `Include Hidden`, and metadata-backed entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct FolderDataSourceFactory;

impl FolderDataSourceFactory {
    pub fn new() -> Self {
        Self
    }

    /// Builds the concrete source, skipping the boxing of
    /// [`DataSourceFactory::make_data_source`].
    pub fn build(&self, config: &BoundConfiguration) -> Result<FolderDataSource> {
        let root: PathBuf = config.value(&ROOT_PATH)?;

        let filter = if config.contains(&FILTER_NAME) {
            Some(SearchPattern::new(config.value::<String>(&FILTER_NAME)?))
        } else {
            None
        };
        let include_hidden = config.get_or_default(&INCLUDE_HIDDEN, || false)?;

        let watchers: Arc<dyn FolderWatcherFactory> = if config.contains(&WATCHER_FACTORY) {
            config.value(&WATCHER_FACTORY)?
        } else {
            let millis = config.get_or_default(&CHANGE_FILTER_MILLIS, || 0i64)?;
            let mut factory = NotifyWatcherFactory::new()
                .with_change_filter(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
                .with_hidden(include_hidden);
            if let Some(filter) = &filter {
                factory = factory.with_filter(filter)?;
            }
            Arc::new(factory)
        };

        let interactors = config.get_or_default(&INTERACTOR_FACTORY, || {
            Arc::new(LocalDirectoryInteractorFactory) as Arc<dyn DirectoryInteractorFactory>
        })?;
        let entries = config.get_or_default(&ENTRY_FACTORY, || {
            Arc::new(LocalFileEntryFactory) as Arc<dyn FileEntryFactory>
        })?;

        debug!(
            "Building folder source for {} (filter: {:?}, hidden: {})",
            root.display(),
            filter.as_ref().map(|f| f.pattern.as_str()),
            include_hidden
        );

        FolderDataSource::new(
            root,
            FolderCollaborators {
                interactors,
                watchers,
                entries,
            },
            FolderOptions {
                filter,
                include_hidden,
            },
        )
    }
}

impl Configurable for FolderDataSourceFactory {
    fn requirements(&self) -> Vec<Requirement> {
        vec![
            ROOT_PATH.clone(),
            CHANGE_FILTER_MILLIS.clone(),
            FILTER_NAME.clone(),
            WATCHER_FACTORY.clone(),
            INTERACTOR_FACTORY.clone(),
            ENTRY_FACTORY.clone(),
            INCLUDE_HIDDEN.clone(),
        ]
    }
}

impl DataSourceFactory<FileEntry> for FolderDataSourceFactory {
    fn make_data_source(&self, config: &BoundConfiguration) -> Result<BoxedDataSource<FileEntry>> {
        Ok(Box::new(self.build(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Bindings;
    use crate::error::{DataSourceError, RequirementError};
    use crate::source::DataSource;
    use tempfile::TempDir;

    #[test]
    fn test_requirements_are_described() {
        let descriptors = FolderDataSourceFactory.describe_requirements();
        assert_eq!(descriptors.len(), 7);

        let json = serde_json::to_value(&descriptors).unwrap();
        assert_eq!(json[0]["name"], "Root Path");
        assert_eq!(json[0]["optional"], false);
        assert_eq!(
            json[3]["exclusiveWith"],
            serde_json::json!(["Change Filter Millis", "Filter Name"])
        );
    }

    #[test]
    fn test_missing_root_path() {
        let err = FolderDataSourceFactory
            .configure(&Bindings::new())
            .unwrap_err();
        assert_eq!(
            err.failures(),
            &[RequirementError::Missing {
                name: ROOT_PATH_NAME.to_string()
            }]
        );
    }

    #[test]
    fn test_negative_change_filter_and_bad_glob_reported_together() {
        let bindings = Bindings::new()
            .bind(&ROOT_PATH, PathBuf::from("/tmp"))
            .bind(&CHANGE_FILTER_MILLIS, -5i64)
            .bind(&FILTER_NAME, "[oops".to_string());

        let err = FolderDataSourceFactory.configure(&bindings).unwrap_err();
        assert_eq!(err.len(), 2);
        assert!(err.mentions(CHANGE_FILTER_NAME));
        assert!(err.mentions(FILTER_NAME_NAME));
    }

    #[test]
    fn test_custom_watcher_conflicts_with_filter() {
        let watcher: Arc<dyn FolderWatcherFactory> = Arc::new(NotifyWatcherFactory::new());
        let bindings = Bindings::new()
            .bind(&ROOT_PATH, PathBuf::from("/tmp"))
            .bind(&FILTER_NAME, "*.txt".to_string())
            .bind(&WATCHER_FACTORY, watcher);

        let err = FolderDataSourceFactory.configure(&bindings).unwrap_err();
        assert!(err.mentions(WATCHER_FACTORY_NAME));
        assert!(err.mentions(FILTER_NAME_NAME));
    }

    #[test]
    fn test_create_from_json_with_filter() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"b").unwrap();

        let json = serde_json::json!({
            "Root Path": dir.path(),
            "Filter Name": "*.txt",
            "Change Filter Millis": 50,
        });
        let factory = FolderDataSourceFactory::new();
        let bindings = Bindings::from_json(&factory.requirements(), &json).unwrap();

        let source = factory.create(&bindings).unwrap();
        assert_eq!(source.count(), 1);
        assert_eq!(source.items()[0].name(), "a.txt");
        source.dispose().unwrap();
    }

    #[test]
    fn test_create_with_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let bindings = Bindings::new().bind(&ROOT_PATH, dir.path().join("missing"));

        let err = FolderDataSourceFactory.create(&bindings).err().expect("expected an error");
        assert!(!matches!(err, DataSourceError::Configuration(_)));
    }
}
