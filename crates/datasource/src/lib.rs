//! Composable, change-notifying data sources.
//!
//! Two halves: a requirement engine ([`config`]) that turns caller-supplied
//! values into a verified [`BoundConfiguration`], and data sources
//! ([`source`], [`folder`]) that enumerate identifiable items and report
//! incremental changes.

pub mod config;
pub mod error;
pub mod folder;
pub mod identity;
pub mod source;
pub mod telemetry;

pub use config::{Bindings, BoundConfiguration, ConfigValue, Configurable, Requirement};
pub use error::{DataSourceError, EntryError, RequirementError, Result, ValidationFailures};
pub use folder::{FileEntry, FolderDataSource, FolderDataSourceFactory};
pub use identity::{ComparisonResults, FilePath, IdentityWrapper, UniquelyIdentifiable};
pub use source::{
    ChangeEvent, ChangeKind, CompositeDataSource, DataSource, DataSourceFactory,
    MemoryDataSource, Subscription, TransformDataSource,
};
pub use telemetry::{init_tracing, TelemetryConfig, TelemetryError};
