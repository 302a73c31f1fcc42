//! Transforming loader
//!
//! Resolves dotted unit names to materialized units:
//!
//! 1. a recorded failure fails fast
//! 2. load-exempt names are delegated to the host runtime
//! 3. cached units are returned as-is
//! 4. otherwise the unit is located, read, attributed, patched and
//!    materialized, and the outcome is settled in the cache
//!
//! Every outcome of step 4 (and failures of step 2) is cached for the
//! lifetime of the loader.

use crate::cache::{CacheStats, Resolution, ResolutionCache};
use crate::error::{Cause, LoadError};
use crate::exemption::Exemptions;
use crate::name::resource_path;
use crate::patch::{BytePatcher, PatchContext, PatchRegistry};
use crate::pipeline::Pipeline;
use crate::provenance::{self, Provenance};
use crate::resource::{Resource, ResourceLocator};
use crate::runtime::{self, HostRuntime, Unit};
use std::error::Error;
use std::io;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Lazy, cached, transforming unit loader
pub struct TransformingLoader {
    locator: Arc<dyn ResourceLocator>,
    runtime: Arc<dyn HostRuntime>,
    pipeline: Pipeline,
    exemptions: Exemptions,
    cache: ResolutionCache,
    strict_provenance: bool,
}

/// Builder for [`TransformingLoader`]
pub struct LoaderBuilder {
    locator: Arc<dyn ResourceLocator>,
    runtime: Arc<dyn HostRuntime>,
    patches: Arc<PatchRegistry>,
    load_exemptions: Vec<String>,
    transform_exemptions: Vec<String>,
    single_flight: bool,
    strict_provenance: bool,
}

impl LoaderBuilder {
    /// Use a shared patch registry
    pub fn patches(mut self, patches: Arc<PatchRegistry>) -> Self {
        self.patches = patches;
        self
    }

    /// Serialize concurrent resolutions of the same name
    pub fn single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    /// Poison names whose provenance cannot be extracted
    pub fn strict_provenance(mut self, enabled: bool) -> Self {
        self.strict_provenance = enabled;
        self
    }

    pub fn load_exemption(mut self, prefix: impl Into<String>) -> Self {
        self.load_exemptions.push(prefix.into());
        self
    }

    pub fn transform_exemption(mut self, prefix: impl Into<String>) -> Self {
        self.transform_exemptions.push(prefix.into());
        self
    }

    pub fn build(self) -> TransformingLoader {
        let exemptions = Exemptions::new();
        for prefix in self.load_exemptions {
            exemptions.add_load_exemption(prefix);
        }
        for prefix in self.transform_exemptions {
            exemptions.add_transform_exemption(prefix);
        }

        TransformingLoader {
            locator: self.locator,
            runtime: self.runtime,
            pipeline: Pipeline::new(self.patches),
            exemptions,
            cache: ResolutionCache::new(self.single_flight),
            strict_provenance: self.strict_provenance,
        }
    }
}

impl TransformingLoader {
    /// Create a loader with no patches and default settings
    pub fn new(locator: Arc<dyn ResourceLocator>, runtime: Arc<dyn HostRuntime>) -> Self {
        Self::builder(locator, runtime).build()
    }

    pub fn builder(
        locator: Arc<dyn ResourceLocator>,
        runtime: Arc<dyn HostRuntime>,
    ) -> LoaderBuilder {
        LoaderBuilder {
            locator,
            runtime,
            patches: Arc::new(PatchRegistry::new()),
            load_exemptions: Vec::new(),
            transform_exemptions: Vec::new(),
            single_flight: false,
            strict_provenance: false,
        }
    }

    /// The patch registry this loader applies
    pub fn patches(&self) -> &Arc<PatchRegistry> {
        self.pipeline.registry()
    }

    pub fn runtime(&self) -> &Arc<dyn HostRuntime> {
        &self.runtime
    }

    /// Resolve `name` to a materialized unit.
    ///
    /// Load-exempt names always go to the host runtime, even if the loader
    /// materialized them before the exemption was added. If that delegation
    /// fails, the failure replaces the earlier unit: the name is poisoned and
    /// the error is returned.
    pub fn resolve(&self, name: &str) -> Result<Arc<Unit>, LoadError> {
        match self.cache.get(name) {
            Some(Resolution::Poisoned(cause)) => {
                trace!("{} is poisoned", name);
                return Err(poisoned(name, cause));
            }
            Some(Resolution::Materialized(unit)) if !self.exemptions.is_load_exempt(name) => {
                trace!("Cache hit for {}", name);
                return Ok(unit);
            }
            _ => {}
        }

        if self.exemptions.is_load_exempt(name) {
            return self.delegate(name);
        }

        self.cache.with_flight(name, || {
            // A flight we waited on may have settled the name.
            if let Some(settled) = self.cache.get(name) {
                return outcome(name, settled);
            }
            self.load(name)
        })
    }

    /// Hand a load-exempt name to the host runtime.
    fn delegate(&self, name: &str) -> Result<Arc<Unit>, LoadError> {
        debug!("Delegating load-exempt {} to the host runtime", name);
        match self.runtime.load_native(name) {
            Ok(unit) => Ok(unit),
            Err(e) => {
                let err = LoadError::DelegatedLoad {
                    name: name.to_string(),
                    source: Arc::new(e),
                };
                if self.cache.is_materialized(name) {
                    error!("Poisoning {} over its earlier unit: {}", name, err);
                    self.cache.poison(name, Arc::new(err.clone()));
                    return Err(err);
                }
                self.fail(name, err)
            }
        }
    }

    /// Locate, read, attribute, patch and materialize `name`, then settle.
    fn load(&self, name: &str) -> Result<Arc<Unit>, LoadError> {
        match self.materialize(name) {
            Ok(unit) => {
                let (settled, inserted) = self.cache.settle(name, Resolution::Materialized(unit));
                if inserted {
                    debug!("Materialized {}", name);
                }
                outcome(name, settled)
            }
            Err(e) => self.fail(name, e),
        }
    }

    fn materialize(&self, name: &str) -> Result<Arc<Unit>, LoadError> {
        let path = resource_path(name);
        let resource = self
            .locator
            .locate(&path)
            .map_err(|e| io_error(name, e))?
            .ok_or_else(|| LoadError::ResourceNotFound {
                name: name.to_string(),
            })?;

        debug!("Loading {} from {}", name, resource.url());
        let raw = resource.read_bytes().map_err(|e| io_error(name, e))?;

        let provenance = self.provenance(name, &resource, &raw)?;

        let bytes = self
            .pipeline
            .apply(self, name, raw)
            .map_err(|e| LoadError::Transformation {
                name: name.to_string(),
                source: Arc::new(e),
            })?;

        runtime::materialize(self.runtime.as_ref(), name, bytes, provenance).map_err(|e| {
            LoadError::Materialization {
                name: name.to_string(),
                source: Arc::new(e),
            }
        })
    }

    fn provenance(
        &self,
        name: &str,
        resource: &Resource,
        raw: &[u8],
    ) -> Result<Option<Provenance>, LoadError> {
        if !self.strict_provenance {
            return Ok(provenance::resolve(name, resource, raw));
        }
        provenance::try_resolve(resource, raw).map_err(|e| LoadError::Provenance {
            name: name.to_string(),
            source: Arc::new(e),
        })
    }

    /// Record `err` as the cause for `name` unless a racer settled first.
    fn fail(&self, name: &str, err: LoadError) -> Result<Arc<Unit>, LoadError> {
        let cause: Cause = Arc::new(err.clone());
        match self.cache.settle(name, Resolution::Poisoned(cause)) {
            (_, true) => {
                error!("Poisoning {}: {}", name, err);
                Err(err)
            }
            (settled, false) => outcome(name, settled),
        }
    }

    /// Forcibly poison `name`, replacing any cached unit.
    pub fn invalidate(&self, name: &str, cause: impl Into<Box<dyn Error + Send + Sync>>) {
        let cause: Cause = Arc::from(cause.into());
        warn!("Invalidating {}: {}", name, cause);
        self.cache.poison(name, cause);
    }

    /// Clear a recorded failure so the next `resolve` retries.
    ///
    /// Returns `false` if `name` was not poisoned.
    pub fn revalidate(&self, name: &str) -> bool {
        let cleared = self.cache.clear_poison(name);
        if cleared {
            debug!("Revalidated {}", name);
        }
        cleared
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.cache.is_materialized(name)
    }

    pub fn is_invalid(&self, name: &str) -> bool {
        self.cache.is_poisoned(name)
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn add_load_exemption(&self, prefix: impl Into<String>) -> bool {
        self.exemptions.add_load_exemption(prefix)
    }

    pub fn add_transform_exemption(&self, prefix: impl Into<String>) -> bool {
        self.exemptions.add_transform_exemption(prefix)
    }

    pub fn load_exemptions(&self) -> Vec<String> {
        self.exemptions.load_exemptions()
    }

    pub fn transform_exemptions(&self) -> Vec<String> {
        self.exemptions.transform_exemptions()
    }
}

impl PatchContext for TransformingLoader {
    fn read_raw_bytes(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        match self.locator.locate(&resource_path(name))? {
            Some(resource) => resource.read_bytes().map(Some),
            None => Ok(None),
        }
    }

    fn read_classpath_resource(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        match self.runtime.find_resource(&resource_path(name))? {
            Some(resource) => resource.read_bytes().map(Some),
            None => Ok(None),
        }
    }

    fn patchers(&self) -> Vec<Arc<dyn BytePatcher>> {
        self.pipeline.registry().patchers()
    }

    fn is_load_exempt(&self, name: &str) -> bool {
        self.exemptions.is_load_exempt(name)
    }

    fn is_transform_exempt(&self, name: &str) -> bool {
        self.exemptions.is_transform_exempt(name)
    }
}

impl std::fmt::Debug for TransformingLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformingLoader")
            .field("patches", self.pipeline.registry())
            .field("exemptions", &self.exemptions)
            .field("cache", &self.cache.stats())
            .field("single_flight", &self.cache.is_single_flight())
            .field("strict_provenance", &self.strict_provenance)
            .finish()
    }
}

fn outcome(name: &str, resolution: Resolution) -> Result<Arc<Unit>, LoadError> {
    match resolution {
        Resolution::Materialized(unit) => Ok(unit),
        Resolution::Poisoned(cause) => Err(poisoned(name, cause)),
    }
}

fn poisoned(name: &str, cause: Cause) -> LoadError {
    LoadError::Poisoned {
        name: name.to_string(),
        cause,
    }
}

fn io_error(name: &str, e: io::Error) -> LoadError {
    LoadError::Io {
        name: name.to_string(),
        source: Arc::new(e),
    }
}
