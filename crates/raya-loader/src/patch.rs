//! Byte patches and the patch registry
//!
//! A patch rewrites a unit's bytes before it is materialized. Patches run in
//! registration order and receive a [`PatchContext`] so they can inspect the
//! raw bytes of other units without materializing them.

use parking_lot::RwLock;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Errors a patch can report
#[derive(Debug, Error)]
pub enum PatchError {
    /// The unit bytes are not what the patch expects
    #[error("Malformed unit: {0}")]
    Malformed(String),

    /// Reading related bytes through the context failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Any other patch failure
    #[error("{0}")]
    Other(String),
}

/// Services the loader exposes to patches
pub trait PatchContext {
    /// Untransformed bytes of `name`, located through the loader's search path
    fn read_raw_bytes(&self, name: &str) -> io::Result<Option<Vec<u8>>>;

    /// Bytes of `name` as found on the host runtime's own search path
    fn read_classpath_resource(&self, name: &str) -> io::Result<Option<Vec<u8>>>;

    /// The registered patch chain, in order
    fn patchers(&self) -> Vec<Arc<dyn BytePatcher>>;

    fn is_load_exempt(&self, name: &str) -> bool;

    fn is_transform_exempt(&self, name: &str) -> bool;
}

/// A byte-level unit transformation
pub trait BytePatcher: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Rewrite the bytes of unit `target`
    fn patch(
        &self,
        ctx: &dyn PatchContext,
        target: &str,
        bytes: Vec<u8>,
    ) -> Result<Vec<u8>, PatchError>;
}

type PatchFn =
    dyn Fn(&dyn PatchContext, &str, Vec<u8>) -> Result<Vec<u8>, PatchError> + Send + Sync;

struct FnPatcher {
    name: String,
    f: Box<PatchFn>,
}

impl BytePatcher for FnPatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn patch(
        &self,
        ctx: &dyn PatchContext,
        target: &str,
        bytes: Vec<u8>,
    ) -> Result<Vec<u8>, PatchError> {
        (self.f)(ctx, target, bytes)
    }
}

/// Build a patcher from a closure
pub fn from_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn BytePatcher>
where
    F: Fn(&dyn PatchContext, &str, Vec<u8>) -> Result<Vec<u8>, PatchError> + Send + Sync + 'static,
{
    Arc::new(FnPatcher {
        name: name.into(),
        f: Box::new(f),
    })
}

/// Ordered, append-only list of patches
#[derive(Default)]
pub struct PatchRegistry {
    patchers: RwLock<Vec<Arc<dyn BytePatcher>>>,
}

impl PatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a patch at the end of the chain
    pub fn register(&self, patcher: Arc<dyn BytePatcher>) {
        self.patchers.write().push(patcher);
    }

    /// Snapshot of the chain
    pub fn patchers(&self) -> Vec<Arc<dyn BytePatcher>> {
        self.patchers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.patchers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.patchers.read().is_empty()
    }

    /// Run the whole chain over `bytes`.
    ///
    /// The chain is snapshotted first, so patches may call back into the
    /// registry through the context. On failure, returns the failing
    /// patcher's name with its error.
    pub fn apply(
        &self,
        ctx: &dyn PatchContext,
        target: &str,
        bytes: Vec<u8>,
    ) -> Result<Vec<u8>, (String, PatchError)> {
        let mut bytes = bytes;
        for patcher in self.patchers() {
            bytes = patcher
                .patch(ctx, target, bytes)
                .map_err(|e| (patcher.name().to_string(), e))?;
        }
        Ok(bytes)
    }
}

impl std::fmt::Debug for PatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .patchers
            .read()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        f.debug_struct("PatchRegistry").field("patchers", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullContext;

    impl PatchContext for NullContext {
        fn read_raw_bytes(&self, _name: &str) -> io::Result<Option<Vec<u8>>> {
            Ok(None)
        }

        fn read_classpath_resource(&self, _name: &str) -> io::Result<Option<Vec<u8>>> {
            Ok(None)
        }

        fn patchers(&self) -> Vec<Arc<dyn BytePatcher>> {
            Vec::new()
        }

        fn is_load_exempt(&self, _name: &str) -> bool {
            false
        }

        fn is_transform_exempt(&self, _name: &str) -> bool {
            false
        }
    }

    fn append(name: &str, byte: u8) -> Arc<dyn BytePatcher> {
        from_fn(name, move |_, _, mut bytes| {
            bytes.push(byte);
            Ok(bytes)
        })
    }

    #[test]
    fn test_apply_in_registration_order() {
        let registry = PatchRegistry::new();
        registry.register(append("one", 1));
        registry.register(append("two", 2));

        let out = registry.apply(&NullContext, "a.B", vec![0]).unwrap();
        assert_eq!(out, vec![0, 1, 2]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_empty_registry_is_identity() {
        let registry = PatchRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.apply(&NullContext, "a.B", vec![9]).unwrap(), vec![9]);
    }

    #[test]
    fn test_failure_names_patcher_and_stops_chain() {
        let registry = PatchRegistry::new();
        registry.register(from_fn("broken", |_, target, _| {
            Err(PatchError::Malformed(format!("{} has no body", target)))
        }));
        registry.register(append("never", 1));

        let (patcher, error) = registry.apply(&NullContext, "a.B", vec![]).unwrap_err();
        assert_eq!(patcher, "broken");
        assert!(matches!(error, PatchError::Malformed(_)));
    }
}
