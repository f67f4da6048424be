//! File entries held by a folder source.

use std::any::Any;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::EntryError;
use crate::identity::{ComparisonResults, FilePath, UniqueIdentifier, UniquelyIdentifiable};

/// SHA-256 digest of a file's content, rendered as `sha256:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub const PREFIX: &'static str = "sha256:";

    pub fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        io::copy(reader, &mut hasher)?;
        Ok(Self(format!("{}{:x}", Self::PREFIX, hasher.finalize())))
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(format!("{}{:x}", Self::PREFIX, Sha256::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn hex(&self) -> &str {
        self.0.strip_prefix(Self::PREFIX).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the digest memo of an entry stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestState {
    Pending,
    Ready(ContentDigest),
    Failed(EntryError),
}

/// Opens a fresh reader over an entry's content.
pub type Opener = Arc<dyn Fn() -> io::Result<Box<dyn Read + Send>> + Send + Sync>;

struct FileEntryInner {
    name: String,
    path: FilePath,
    size: u64,
    created: Option<DateTime<Utc>>,
    modified: Option<DateTime<Utc>>,
    opener: Opener,
    digest: OnceLock<Result<ContentDigest, EntryError>>,
}

/// A file known to a folder source.
///
/// Metadata is captured when the entry is created. The content digest is
/// computed on first use and memoized, including failures; clones share the
/// memo.
#[derive(Clone)]
pub struct FileEntry(Arc<FileEntryInner>);

impl FileEntry {
    pub fn new(
        path: FilePath,
        size: u64,
        created: Option<DateTime<Utc>>,
        modified: Option<DateTime<Utc>>,
        opener: Opener,
    ) -> Self {
        Self(Arc::new(FileEntryInner {
            name: path.file_name(),
            path,
            size,
            created,
            modified,
            opener,
            digest: OnceLock::new(),
        }))
    }

    /// Entry backed by the local file system. Missing metadata is tolerated;
    /// read failures surface from [`FileEntry::try_open`].
    pub fn from_path(path: &FilePath) -> Self {
        let (size, created, modified) = match std::fs::metadata(path.as_path()) {
            Ok(meta) => (
                meta.len(),
                meta.created().ok().map(DateTime::<Utc>::from),
                meta.modified().ok().map(DateTime::<Utc>::from),
            ),
            Err(e) => {
                debug!("No metadata for {}: {}", path, e);
                (0, None, None)
            }
        };

        let target = path.clone().into_path_buf();
        let opener: Opener = Arc::new(move || {
            let file = File::open(&target)?;
            Ok(Box::new(file) as Box<dyn Read + Send>)
        });

        Self::new(path.clone(), size, created, modified, opener)
    }

    /// Entry whose content is the given bytes.
    pub fn in_memory(path: impl Into<FilePath>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Arc<[u8]> = Arc::from(bytes.into());
        let size = bytes.len() as u64;
        let opener: Opener = Arc::new(move || {
            Ok(Box::new(Cursor::new(Arc::clone(&bytes))) as Box<dyn Read + Send>)
        });
        let now = Utc::now();
        Self::new(path.into(), size, Some(now), Some(now), opener)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn path(&self) -> &FilePath {
        &self.0.path
    }

    pub fn size(&self) -> u64 {
        self.0.size
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.0.created
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.0.modified
    }

    pub fn try_open(&self) -> Result<Box<dyn Read + Send>, EntryError> {
        (self.0.opener)().map_err(|e| EntryError::open(self.0.path.as_path(), &e))
    }

    /// Content digest, computed at most once per entry.
    pub fn digest(&self) -> Result<ContentDigest, EntryError> {
        self.0
            .digest
            .get_or_init(|| {
                let mut reader = self.try_open()?;
                let digest = ContentDigest::from_reader(&mut reader)
                    .map_err(|e| EntryError::read(self.0.path.as_path(), &e))?;
                debug!("Digested {}: {}", self.0.path, digest);
                Ok(digest)
            })
            .clone()
    }

    pub fn digest_state(&self) -> DigestState {
        match self.0.digest.get() {
            None => DigestState::Pending,
            Some(Ok(digest)) => DigestState::Ready(digest.clone()),
            Some(Err(e)) => DigestState::Failed(e.clone()),
        }
    }

    pub fn ptr_eq(&self, other: &FileEntry) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl UniquelyIdentifiable for FileEntry {
    fn identifier(&self) -> &dyn UniqueIdentifier {
        &self.0.path
    }

    fn compare(&self, other: Option<&dyn UniquelyIdentifiable>) -> ComparisonResults {
        let Some(other) = other else {
            return ComparisonResults::DIFFERENT;
        };
        let Some(other) = other.as_any().downcast_ref::<FileEntry>() else {
            return ComparisonResults::DIFFERENT;
        };

        let same_file = other.0.path == self.0.path;

        match (self.digest(), other.digest()) {
            (Ok(mine), Ok(theirs)) if mine == theirs => {
                if same_file {
                    ComparisonResults::MATCH
                } else {
                    ComparisonResults::DIFFERENT_BUT_EQUIVALENT
                }
            }
            (Ok(_), Ok(_)) => {
                if same_file {
                    ComparisonResults::DIFFERENT | ComparisonResults::INVALIDATING
                } else {
                    ComparisonResults::DIFFERENT
                }
            }
            // Content unknown: same file is assumed stale.
            _ => {
                if same_file {
                    ComparisonResults::INVALIDATING
                } else {
                    ComparisonResults::DIFFERENT
                }
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileEntry")
            .field("path", &self.0.path)
            .field("size", &self.0.size)
            .field("modified", &self.0.modified)
            .field("digest", &self.digest_state())
            .finish()
    }
}

/// Creates entries for paths reported by enumeration or watching.
pub trait FileEntryFactory: Send + Sync {
    fn from_path(&self, path: &FilePath) -> FileEntry;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileEntryFactory;

impl FileEntryFactory for LocalFileEntryFactory {
    fn from_path(&self, path: &FilePath) -> FileEntry {
        FileEntry::from_path(path)
    }
}
