//! Loader error types.

use crate::format::FormatError;
use crate::pipeline::TransformError;
use crate::provenance::ProvenanceError;
use std::error::Error;
use std::io;
use std::sync::Arc;

/// A recorded failure cause, shared by every later lookup of a poisoned name
pub type Cause = Arc<dyn Error + Send + Sync>;

/// Errors raised by the host runtime while defining or natively loading units.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Unit bytes rejected by the runtime
    #[error("Malformed unit: {0}")]
    Malformed(#[from] FormatError),

    /// Unit from a different origin than the sealed namespace
    #[error("Sealing violation: namespace {namespace} is sealed to {sealed_by}")]
    SealingViolation { namespace: String, sealed_by: String },

    /// No resource on the runtime's own search path
    #[error("Unit not found on the runtime search path: {0}")]
    NotFound(String),

    /// File I/O error
    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Classification of a [`LoadError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ResourceNotFound,
    Io,
    Provenance,
    Transformation,
    Materialization,
    DelegatedLoad,
    Poisoned,
}

/// Errors returned by [`TransformingLoader::resolve`](crate::TransformingLoader::resolve).
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    /// No resource backs the unit
    #[error("Could not find resource for {name}")]
    ResourceNotFound { name: String },

    /// Reading the located resource failed
    #[error("Failed to read {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: Arc<io::Error>,
    },

    /// Provenance extraction failed while strict provenance is enabled
    #[error("Failed to resolve provenance for {name}: {source}")]
    Provenance {
        name: String,
        #[source]
        source: Arc<ProvenanceError>,
    },

    /// The patch chain failed
    #[error("Failed to transform {name}: {source}")]
    Transformation {
        name: String,
        #[source]
        source: Arc<TransformError>,
    },

    /// The host runtime rejected the transformed unit
    #[error("Failed to materialize {name}: {source}")]
    Materialization {
        name: String,
        #[source]
        source: Arc<RuntimeError>,
    },

    /// Native loading of a load-exempt unit failed
    #[error("Failed to load exempt unit {name}: {source}")]
    DelegatedLoad {
        name: String,
        #[source]
        source: Arc<RuntimeError>,
    },

    /// An earlier failure was recorded for this unit
    #[error("Failed to load {name}: {cause}")]
    Poisoned {
        name: String,
        #[source]
        cause: Cause,
    },
}

impl LoadError {
    /// The unit name this error is about
    pub fn name(&self) -> &str {
        match self {
            LoadError::ResourceNotFound { name }
            | LoadError::Io { name, .. }
            | LoadError::Provenance { name, .. }
            | LoadError::Transformation { name, .. }
            | LoadError::Materialization { name, .. }
            | LoadError::DelegatedLoad { name, .. }
            | LoadError::Poisoned { name, .. } => name,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LoadError::ResourceNotFound { .. } => ErrorKind::ResourceNotFound,
            LoadError::Io { .. } => ErrorKind::Io,
            LoadError::Provenance { .. } => ErrorKind::Provenance,
            LoadError::Transformation { .. } => ErrorKind::Transformation,
            LoadError::Materialization { .. } => ErrorKind::Materialization,
            LoadError::DelegatedLoad { .. } => ErrorKind::DelegatedLoad,
            LoadError::Poisoned { .. } => ErrorKind::Poisoned,
        }
    }

    /// Kind of the original failure: looks through `Poisoned` to the
    /// recorded cause when that cause is itself a `LoadError`.
    pub fn root_kind(&self) -> ErrorKind {
        match self {
            LoadError::Poisoned { cause, .. } => cause
                .downcast_ref::<LoadError>()
                .map(LoadError::root_kind)
                .unwrap_or(ErrorKind::Poisoned),
            other => other.kind(),
        }
    }

    /// The recorded cause of a poisoned lookup
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            LoadError::Poisoned { cause, .. } => Some(cause),
            _ => None,
        }
    }
}
