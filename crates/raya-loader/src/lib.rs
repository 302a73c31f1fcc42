//! Raya Unit Loader
//!
//! Lazy, cached, transforming loader for Raya code units. Given the dotted
//! name of a unit, the loader:
//! - locates the unit's raw bytes on a search path (directories and unit archives)
//! - resolves provenance (archive origin, entry signatures, shared manifest)
//! - runs the bytes through the registered patch chain
//! - materializes the result into a host runtime and caches the outcome
//!
//! Failures are remembered per name: a unit that failed once keeps failing
//! with the recorded cause until it is explicitly revalidated.

#![warn(rust_2018_idioms)]

pub mod archive;
pub mod cache;
pub mod config;
pub mod error;
pub mod exemption;
pub mod format;
pub mod loader;
pub mod manifest;
pub mod name;
pub mod patch;
pub mod pipeline;
pub mod provenance;
pub mod resource;
pub mod runtime;

pub use archive::{ArchiveError, UnitArchive};
pub use cache::{CacheStats, Resolution, ResolutionCache};
pub use config::{ConfigError, LoaderConfig};
pub use error::{Cause, ErrorKind, LoadError, RuntimeError};
pub use exemption::{Exemptions, PrefixSet, BUILTIN_LOAD_EXEMPTIONS, LOADER_NAMESPACE};
pub use format::{FormatError, UnitHeader};
pub use loader::{LoaderBuilder, TransformingLoader};
pub use manifest::{ContainerManifest, ManifestError, NamespaceAttributes};
pub use patch::{BytePatcher, PatchContext, PatchError, PatchRegistry};
pub use pipeline::{Pipeline, TransformError};
pub use provenance::{Provenance, ProvenanceError, SigningAssertion};
pub use resource::{MemoryLocator, Resource, ResourceLocator, SearchPath, SearchPathEntry};
pub use runtime::{HostRuntime, Namespace, Unit, UnitTable};
