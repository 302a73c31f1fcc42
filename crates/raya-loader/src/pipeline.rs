//! Transformation pipeline
//!
//! Routes a unit's bytes through the patch registry, unless the unit is
//! transform-exempt.

use crate::patch::{PatchContext, PatchError, PatchRegistry};
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// A patch in the chain failed
#[derive(Debug, Error)]
#[error("Patch '{patcher}' failed: {source}")]
pub struct TransformError {
    /// Name of the failing patch
    pub patcher: String,
    #[source]
    pub source: PatchError,
}

/// The transformation stage of the loader
#[derive(Debug, Clone)]
pub struct Pipeline {
    patches: Arc<PatchRegistry>,
}

impl Pipeline {
    pub fn new(patches: Arc<PatchRegistry>) -> Self {
        Self { patches }
    }

    pub fn registry(&self) -> &Arc<PatchRegistry> {
        &self.patches
    }

    /// Transform `bytes` of unit `name`.
    pub fn apply(
        &self,
        ctx: &dyn PatchContext,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<Vec<u8>, TransformError> {
        if ctx.is_transform_exempt(name) {
            trace!("{} is transform-exempt, skipping patches", name);
            return Ok(bytes);
        }

        self.patches
            .apply(ctx, name, bytes)
            .map_err(|(patcher, source)| TransformError { patcher, source })
    }
}
