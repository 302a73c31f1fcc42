//! Resource location
//!
//! A [`ResourceLocator`] maps a resource path (`a/b/C.ryb`) to at most one
//! [`Resource`]. The loader's search path and the host runtime's search path
//! are both locators.

use crate::archive::{ArchiveError, UnitArchive};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Locates unit resources by path.
pub trait ResourceLocator: Send + Sync {
    /// Find the resource at `path`, or `Ok(None)` if no entry provides it.
    fn locate(&self, path: &str) -> io::Result<Option<Resource>>;
}

/// Where a located resource's bytes live.
#[derive(Debug, Clone)]
pub enum ResourceSource {
    /// A file on disk
    File(PathBuf),
    /// An entry inside a unit archive
    Entry {
        archive: Arc<UnitArchive>,
        entry: String,
    },
    /// Bytes held in memory
    Memory(Arc<[u8]>),
}

/// A located resource: a URL plus the means to read its bytes.
#[derive(Debug, Clone)]
pub struct Resource {
    url: String,
    source: ResourceSource,
}

impl Resource {
    /// Resource backed by a file on disk.
    ///
    /// The URL is built from the canonical path, so the file must exist.
    pub fn file(path: PathBuf) -> io::Result<Self> {
        let absolute = path.canonicalize()?;
        let url = Url::from_file_path(&absolute).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot build a file URL for {}", absolute.display()),
            )
        })?;
        Ok(Self {
            url: url.into(),
            source: ResourceSource::File(path),
        })
    }

    /// Resource backed by an archive entry
    pub fn entry(archive: Arc<UnitArchive>, entry: impl Into<String>) -> Self {
        let entry = entry.into();
        Self {
            url: format!("archive:{}!/{}", archive.origin(), entry),
            source: ResourceSource::Entry { archive, entry },
        }
    }

    /// Resource backed by in-memory bytes
    pub fn memory(url: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            url: url.into(),
            source: ResourceSource::Memory(bytes.into()),
        }
    }

    /// URL identifying this resource
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn source(&self) -> &ResourceSource {
        &self.source
    }

    /// The archive and entry name, if this resource lives in a unit archive.
    pub fn container(&self) -> Option<(&Arc<UnitArchive>, &str)> {
        match &self.source {
            ResourceSource::Entry { archive, entry } => Some((archive, entry.as_str())),
            _ => None,
        }
    }

    /// Read the resource's bytes (blocking).
    pub fn read_bytes(&self) -> io::Result<Vec<u8>> {
        match &self.source {
            ResourceSource::File(path) => fs::read(path),
            ResourceSource::Entry { archive, entry } => {
                archive.read_entry(entry)?.ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("entry {} disappeared from {}", entry, archive.origin()),
                    )
                })
            }
            ResourceSource::Memory(bytes) => Ok(bytes.to_vec()),
        }
    }
}

/// One entry of a search path
#[derive(Debug, Clone)]
pub enum SearchPathEntry {
    /// Directory searched by resource path
    Directory(PathBuf),
    /// Opened unit archive
    Archive(Arc<UnitArchive>),
}

/// Ordered list of directories and unit archives. The first entry that
/// provides a path wins.
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    entries: Vec<SearchPathEntry>,
}

impl SearchPath {
    /// Create a search path from already-opened entries
    pub fn new(entries: Vec<SearchPathEntry>) -> Self {
        Self { entries }
    }

    /// Build a search path from filesystem paths.
    ///
    /// Directories are searched as-is; files are opened as unit archives.
    pub fn from_paths<I, P>(paths: I) -> Result<Self, ArchiveError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut entries = Vec::new();
        for path in paths {
            let path = path.as_ref();
            if path.is_dir() {
                entries.push(SearchPathEntry::Directory(path.to_path_buf()));
            } else {
                entries.push(SearchPathEntry::Archive(Arc::new(UnitArchive::open(path)?)));
            }
        }
        Ok(Self { entries })
    }

    /// Append an entry at the lowest priority
    pub fn push(&mut self, entry: SearchPathEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[SearchPathEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResourceLocator for SearchPath {
    fn locate(&self, path: &str) -> io::Result<Option<Resource>> {
        for entry in &self.entries {
            match entry {
                SearchPathEntry::Directory(dir) => {
                    let candidate = path.split('/').fold(dir.clone(), |acc, part| acc.join(part));
                    if candidate.is_file() {
                        return Resource::file(candidate).map(Some);
                    }
                }
                SearchPathEntry::Archive(archive) => {
                    if archive.contains(path) {
                        return Ok(Some(Resource::entry(archive.clone(), path)));
                    }
                }
            }
        }
        Ok(None)
    }
}

/// In-memory locator, for units produced at runtime.
#[derive(Debug, Default)]
pub struct MemoryLocator {
    resources: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MemoryLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes at `path`, replacing any previous bytes
    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.resources.write().insert(path.into(), bytes.into());
    }

    /// Remove the bytes at `path`
    pub fn remove(&self, path: &str) -> bool {
        self.resources.write().remove(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.resources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.read().is_empty()
    }
}

impl ResourceLocator for MemoryLocator {
    fn locate(&self, path: &str) -> io::Result<Option<Resource>> {
        Ok(self
            .resources
            .read()
            .get(path)
            .map(|bytes| Resource::memory(format!("memory:///{}", path), bytes.clone())))
    }
}
