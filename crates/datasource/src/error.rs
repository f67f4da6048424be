use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("Failed to enumerate '{path}': {source}")]
    Enumerate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Directory walk failed for '{path}': {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to watch '{path}': {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Invalid search pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ValidationFailures),

    #[error("Invalid bindings document: {message}")]
    Bindings { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Requirement error: {0}")]
    Requirement(#[from] RequirementError),

    #[error("{} data source(s) failed: {}", .0.len(), join_messages(.0))]
    Aggregate(Vec<DataSourceError>),
}

/// Failure attached to a single requirement during binding or lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequirementError {
    #[error("Missing required argument. Name: '{name}'")]
    Missing { name: String },

    #[error("Argument '{name}' is of wrong type. Expected '{expected}', got '{actual}'")]
    WrongType {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Argument '{name}' failed validation: {message}")]
    Invalid { name: String, message: String },

    #[error("Validator for argument '{name}' panicked: {message}")]
    ValidatorPanicked { name: String, message: String },

    #[error("Argument '{name}' does not have its dependencies fulfilled (missing: {})", .missing.join(", "))]
    UnmetDependency { name: String, missing: Vec<String> },

    #[error("Argument '{name}' has conflicting requirements specified (conflicts with: {})", .conflicts.join(", "))]
    Conflict {
        name: String,
        conflicts: Vec<String>,
    },

    #[error("Requirement name '{name}' is declared more than once")]
    DuplicateName { name: String },

    #[error("Requirement {field} must not be blank")]
    BlankField { field: &'static str },

    #[error("Argument '{name}' is not bound")]
    NotBound { name: String },
}

impl RequirementError {
    /// Name of the requirement this failure is about, if any.
    pub fn requirement_name(&self) -> Option<&str> {
        match self {
            RequirementError::Missing { name }
            | RequirementError::WrongType { name, .. }
            | RequirementError::Invalid { name, .. }
            | RequirementError::ValidatorPanicked { name, .. }
            | RequirementError::UnmetDependency { name, .. }
            | RequirementError::Conflict { name, .. }
            | RequirementError::DuplicateName { name }
            | RequirementError::NotBound { name } => Some(name),
            RequirementError::BlankField { .. } => None,
        }
    }
}

/// Every failure collected while binding a requirement set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Supplied requirements failed validation: {}", join_messages(.failures))]
pub struct ValidationFailures {
    failures: Vec<RequirementError>,
}

impl ValidationFailures {
    pub(crate) fn new(failures: Vec<RequirementError>) -> Self {
        Self { failures }
    }

    pub fn failures(&self) -> &[RequirementError] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns true if any failure refers to the named requirement.
    pub fn mentions(&self, name: &str) -> bool {
        self.failures
            .iter()
            .any(|f| f.requirement_name() == Some(name))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RequirementError> {
        self.failures.iter()
    }
}

impl IntoIterator for ValidationFailures {
    type Item = RequirementError;
    type IntoIter = std::vec::IntoIter<RequirementError>;

    fn into_iter(self) -> Self::IntoIter {
        self.failures.into_iter()
    }
}

/// Per-entry I/O failure. Cloneable so a failed digest can be memoized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    #[error("Failed to open '{path}': {message}")]
    Open {
        path: PathBuf,
        kind: io::ErrorKind,
        message: String,
    },

    #[error("Failed to read '{path}': {message}")]
    Read {
        path: PathBuf,
        kind: io::ErrorKind,
        message: String,
    },
}

impl EntryError {
    pub(crate) fn open(path: impl Into<PathBuf>, err: &io::Error) -> Self {
        EntryError::Open {
            path: path.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, err: &io::Error) -> Self {
        EntryError::Read {
            path: path.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn kind(&self) -> io::ErrorKind {
        match self {
            EntryError::Open { kind, .. } | EntryError::Read { kind, .. } => *kind,
        }
    }
}

fn join_messages<E: std::fmt::Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, DataSourceError>;
