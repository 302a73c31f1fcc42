//! Unit archives
//!
//! A unit archive is a zip file of compiled units laid out by resource path
//! (`app/widgets/Button.ryb`). It may also carry:
//! - `raya.toml`: the container manifest shared by every unit in the archive
//! - `raya.sig`: a signature table with ed25519 signatures per entry
//!
//! ```toml
//! [[signature]]
//! entry = "app/widgets/Button.ryb"
//! signer = "release"
//! public-key = "<hex>"
//! signature = "<hex>"
//! ```

use crate::manifest::{ContainerManifest, ManifestError, MANIFEST_PATH};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Cursor, Read, Seek};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use url::Url;
use zip::result::ZipError;
use zip::ZipArchive;

/// Path of the signature table inside a unit archive
pub const SIGNATURES_PATH: &str = "raya.sig";

/// Upper bound on the buffer reserved up front for an entry
const MAX_PREALLOC: usize = 1 << 20;

/// Errors raised while opening or inspecting a unit archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed zip container
    #[error("Invalid unit archive: {0}")]
    Zip(#[from] ZipError),

    /// Archive path could not be expressed as a URL
    #[error("Cannot build an origin URL for {0}")]
    Origin(String),

    /// Malformed manifest
    #[error("Invalid manifest in {origin}: {source}")]
    Manifest {
        origin: Url,
        #[source]
        source: ManifestError,
    },

    /// Malformed signature table
    #[error("Invalid signature table in {origin}: {source}")]
    Signatures {
        origin: Url,
        #[source]
        source: toml::de::Error,
    },
}

/// One record of the signature table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct EntrySignature {
    /// Signed entry path
    pub entry: String,
    /// Human-readable signer identifier
    pub signer: String,
    /// Hex-encoded ed25519 public key
    pub public_key: String,
    /// Hex-encoded ed25519 signature over the entry bytes
    pub signature: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct SignatureTable {
    #[serde(default, rename = "signature")]
    pub(crate) signatures: Vec<EntrySignature>,
}

trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// An opened unit archive.
///
/// The manifest and signature table are parsed lazily, once, and shared by
/// every unit loaded from the archive.
pub struct UnitArchive {
    origin: Url,
    zip: Mutex<ZipArchive<Box<dyn ReadSeek>>>,
    manifest: OnceCell<Option<Arc<ContainerManifest>>>,
    signatures: OnceCell<Arc<SignatureTable>>,
}

impl UnitArchive {
    /// Open a unit archive from disk.
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let absolute = path.canonicalize()?;
        let origin = Url::from_file_path(&absolute)
            .map_err(|_| ArchiveError::Origin(absolute.display().to_string()))?;
        let file = File::open(&absolute)?;
        Self::from_reader(origin, Box::new(file))
    }

    /// Open a unit archive held in memory, identified by `origin`.
    pub fn from_bytes(origin: Url, bytes: Vec<u8>) -> Result<Self, ArchiveError> {
        Self::from_reader(origin, Box::new(Cursor::new(bytes)))
    }

    fn from_reader(origin: Url, reader: Box<dyn ReadSeek>) -> Result<Self, ArchiveError> {
        let zip = ZipArchive::new(reader)?;
        Ok(Self {
            origin,
            zip: Mutex::new(zip),
            manifest: OnceCell::new(),
            signatures: OnceCell::new(),
        })
    }

    /// URL of the archive itself
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Number of entries in the archive
    pub fn len(&self) -> usize {
        self.zip.lock().len()
    }

    /// Check if the archive has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the archive has an entry at `entry`
    pub fn contains(&self, entry: &str) -> bool {
        self.zip.lock().index_for_name(entry).is_some()
    }

    /// Read an entry's bytes. Returns `Ok(None)` when the entry is absent.
    pub fn read_entry(&self, entry: &str) -> io::Result<Option<Vec<u8>>> {
        let mut zip = self.zip.lock();
        let mut file = match zip.by_name(entry) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(io::Error::new(io::ErrorKind::Other, e)),
        };

        let mut bytes = Vec::with_capacity(initial_capacity(file.size()));
        file.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }

    /// The archive manifest, if the archive carries one.
    pub fn manifest(&self) -> Result<Option<Arc<ContainerManifest>>, ArchiveError> {
        self.manifest
            .get_or_try_init(|| -> Result<_, ArchiveError> {
                let Some(bytes) = self.read_entry(MANIFEST_PATH)? else {
                    return Ok(None);
                };
                let manifest = ContainerManifest::from_bytes(&bytes).map_err(|source| {
                    ArchiveError::Manifest {
                        origin: self.origin.clone(),
                        source,
                    }
                })?;
                Ok(Some(Arc::new(manifest)))
            })
            .cloned()
    }

    /// Signature records for exactly `entry`, in table order.
    pub fn signatures_for(&self, entry: &str) -> Result<Vec<EntrySignature>, ArchiveError> {
        let table = self.signatures.get_or_try_init(|| -> Result<_, ArchiveError> {
            let Some(bytes) = self.read_entry(SIGNATURES_PATH)? else {
                return Ok(Arc::new(SignatureTable::default()));
            };
            let text = String::from_utf8_lossy(&bytes);
            let table: SignatureTable =
                toml::from_str(&text).map_err(|source| ArchiveError::Signatures {
                    origin: self.origin.clone(),
                    source,
                })?;
            Ok(Arc::new(table))
        })?;

        Ok(table
            .signatures
            .iter()
            .filter(|record| record.entry == entry)
            .cloned()
            .collect())
    }
}

impl std::fmt::Debug for UnitArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitArchive")
            .field("origin", &self.origin.as_str())
            .finish_non_exhaustive()
    }
}

/// Buffer size to reserve for an entry whose header declares `declared`
/// bytes. The declared size is untrusted.
fn initial_capacity(declared: u64) -> usize {
    usize::try_from(declared).map_or(MAX_PREALLOC, |size| size.min(MAX_PREALLOC))
}
