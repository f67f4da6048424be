//! Directory enumeration.

use std::io;
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{DataSourceError, Result};
use crate::identity::FilePath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOption {
    TopDirectoryOnly,
    AllDirectories,
}

/// A glob matched against entry names, with an optional recursion flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPattern {
    pub pattern: String,
    #[serde(default)]
    pub option: Option<SearchOption>,
}

impl SearchPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            option: None,
        }
    }

    pub fn with_option(mut self, option: SearchOption) -> Self {
        self.option = Some(option);
        self
    }

    pub fn compile(&self) -> Result<glob::Pattern> {
        glob::Pattern::new(&self.pattern).map_err(|e| DataSourceError::Pattern {
            pattern: self.pattern.clone(),
            source: e,
        })
    }

    pub fn is_recursive(&self) -> bool {
        self.option == Some(SearchOption::AllDirectories)
    }
}

/// Lists the files and directories under a path.
pub trait DirectoryInteractor: Send + Sync {
    fn enumerate_files(
        &self,
        path: &FilePath,
        pattern: Option<&SearchPattern>,
    ) -> Result<Vec<FilePath>>;

    fn enumerate_directories(
        &self,
        path: &FilePath,
        pattern: Option<&SearchPattern>,
    ) -> Result<Vec<FilePath>>;
}

pub trait DirectoryInteractorFactory: Send + Sync {
    fn make_interactor(&self) -> Arc<dyn DirectoryInteractor>;
}

/// Enumerates the local file system.
///
/// Without a pattern, or without [`SearchOption::AllDirectories`], only the
/// immediate children of `path` are listed, in file-name order. An
/// unreadable root is an error; unreadable children are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDirectoryInteractor;

impl LocalDirectoryInteractor {
    fn walk(
        &self,
        path: &FilePath,
        pattern: Option<&SearchPattern>,
        want_directories: bool,
    ) -> Result<Vec<FilePath>> {
        let root = path.as_path();
        let metadata = std::fs::metadata(root).map_err(|e| DataSourceError::Enumerate {
            path: root.to_path_buf(),
            source: e,
        })?;
        if !metadata.is_dir() {
            return Err(DataSourceError::Enumerate {
                path: root.to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
            });
        }

        let matcher = pattern.map(SearchPattern::compile).transpose()?;
        let max_depth = if pattern.is_some_and(SearchPattern::is_recursive) {
            usize::MAX
        } else {
            1
        };

        let mut found = Vec::new();
        for entry in WalkDir::new(root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(DataSourceError::Walk {
                        path: root.to_path_buf(),
                        source: e,
                    });
                }
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };

            if entry.file_type().is_dir() != want_directories {
                continue;
            }

            if let Some(matcher) = &matcher {
                let name = entry.file_name().to_string_lossy();
                if !matcher.matches(&name) {
                    continue;
                }
            }

            found.push(FilePath::from(entry.into_path()));
        }

        debug!(
            "Enumerated {} {} in {}",
            found.len(),
            if want_directories { "directories" } else { "files" },
            root.display()
        );
        Ok(found)
    }
}

impl DirectoryInteractor for LocalDirectoryInteractor {
    fn enumerate_files(
        &self,
        path: &FilePath,
        pattern: Option<&SearchPattern>,
    ) -> Result<Vec<FilePath>> {
        self.walk(path, pattern, false)
    }

    fn enumerate_directories(
        &self,
        path: &FilePath,
        pattern: Option<&SearchPattern>,
    ) -> Result<Vec<FilePath>> {
        self.walk(path, pattern, true)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDirectoryInteractorFactory;

impl DirectoryInteractorFactory for LocalDirectoryInteractorFactory {
    fn make_interactor(&self) -> Arc<dyn DirectoryInteractor> {
        Arc::new(LocalDirectoryInteractor)
    }
}
