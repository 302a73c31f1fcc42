//! Host runtime
//!
//! The host runtime owns materialized units. The loader hands it
//! (transformed bytes, provenance) pairs; load-exempt names go straight to
//! [`HostRuntime::load_native`].
//!
//! [`UnitTable`] is the in-process runtime: units and namespaces live in
//! concurrent maps and are defined insert-if-absent by name.

use crate::error::RuntimeError;
use crate::format::UnitHeader;
use crate::manifest::{ContainerManifest, NamespaceAttributes};
use crate::name::{namespace_of, resource_path};
use crate::provenance::{self, Provenance};
use crate::resource::{Resource, ResourceLocator};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// The runtime units are materialized into
pub trait HostRuntime: Send + Sync {
    /// Resolve `name` with the runtime's own mechanism, without patching
    fn load_native(&self, name: &str) -> Result<Arc<Unit>, RuntimeError>;

    /// Locate a resource on the runtime's own search path
    fn find_resource(&self, path: &str) -> io::Result<Option<Resource>>;

    /// A namespace registered earlier, if any
    fn namespace(&self, name: &str) -> Option<Arc<Namespace>>;

    /// Register namespace metadata. Returns the existing namespace if one was
    /// registered first.
    fn define_namespace(
        &self,
        name: &str,
        manifest: Option<&ContainerManifest>,
        origin: Option<&Url>,
    ) -> Result<Arc<Namespace>, RuntimeError>;

    /// Define a unit from its final bytes
    fn define_unit(
        &self,
        name: &str,
        bytes: Vec<u8>,
        provenance: Option<Provenance>,
    ) -> Result<Arc<Unit>, RuntimeError>;
}

/// Namespace metadata, registered once per namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    name: String,
    attributes: NamespaceAttributes,
    origin: Option<Url>,
    sealed_by: Option<Url>,
}

impl Namespace {
    /// Namespace with no manifest metadata
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: NamespaceAttributes::default(),
            origin: None,
            sealed_by: None,
        }
    }

    /// Namespace described by an archive manifest
    pub fn from_manifest(
        name: impl Into<String>,
        manifest: Option<&ContainerManifest>,
        origin: Option<&Url>,
    ) -> Self {
        let name = name.into();
        let attributes = manifest
            .map(|m| m.namespace_attributes(&name))
            .unwrap_or_default();
        let sealed_by = if attributes.sealed {
            origin.cloned()
        } else {
            None
        };
        Self {
            name,
            attributes,
            origin: origin.cloned(),
            sealed_by,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &NamespaceAttributes {
        &self.attributes
    }

    /// Archive the namespace was first registered from
    pub fn origin(&self) -> Option<&Url> {
        self.origin.as_ref()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed_by.is_some()
    }

    /// Reject units whose origin differs from the sealing archive.
    pub fn check_seal(&self, origin: Option<&Url>) -> Result<(), RuntimeError> {
        match &self.sealed_by {
            Some(sealed_by) if origin != Some(sealed_by) => Err(RuntimeError::SealingViolation {
                namespace: self.name.clone(),
                sealed_by: sealed_by.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// A materialized unit
#[derive(Debug)]
pub struct Unit {
    name: String,
    header: UnitHeader,
    bytes: Vec<u8>,
    digest: [u8; 32],
    namespace: Option<Arc<Namespace>>,
    provenance: Option<Provenance>,
}

impl Unit {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header(&self) -> UnitHeader {
        self.header
    }

    /// Bytes exactly as materialized (after patching)
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// SHA-256 of [`Unit::bytes`]
    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }

    pub fn namespace(&self) -> Option<&Arc<Namespace>> {
        self.namespace.as_ref()
    }

    pub fn provenance(&self) -> Option<&Provenance> {
        self.provenance.as_ref()
    }
}

/// Register the namespace (first sight only) and define the unit.
///
/// Namespace metadata comes from the provenance manifest, so it is only
/// registered here for units that carry provenance.
pub fn materialize(
    runtime: &dyn HostRuntime,
    name: &str,
    bytes: Vec<u8>,
    provenance: Option<Provenance>,
) -> Result<Arc<Unit>, RuntimeError> {
    if let (Some(provenance), Some(namespace)) = (&provenance, namespace_of(name)) {
        if runtime.namespace(namespace).is_none() {
            runtime.define_namespace(
                namespace,
                provenance.manifest().map(|m| m.as_ref()),
                Some(provenance.origin()),
            )?;
        }
    }
    runtime.define_unit(name, bytes, provenance)
}

/// In-process host runtime
pub struct UnitTable {
    resources: Arc<dyn ResourceLocator>,
    units: DashMap<String, Arc<Unit>>,
    namespaces: DashMap<String, Arc<Namespace>>,
}

impl UnitTable {
    /// Create a runtime whose own search path is `resources`
    pub fn new(resources: Arc<dyn ResourceLocator>) -> Self {
        Self {
            resources,
            units: DashMap::new(),
            namespaces: DashMap::new(),
        }
    }

    /// Get a defined unit by name
    pub fn get(&self, name: &str) -> Option<Arc<Unit>> {
        self.units.get(name).map(|entry| entry.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    /// Number of defined units
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Number of registered namespaces
    pub fn namespace_count(&self) -> usize {
        self.namespaces.len()
    }

    /// Names of all defined units, sorted
    pub fn unit_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.units.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl HostRuntime for UnitTable {
    fn load_native(&self, name: &str) -> Result<Arc<Unit>, RuntimeError> {
        if let Some(unit) = self.get(name) {
            return Ok(unit);
        }

        let resource = self
            .resources
            .locate(&resource_path(name))?
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        let bytes = resource.read_bytes()?;
        let provenance = provenance::resolve(name, &resource, &bytes);

        debug!("Natively loading {} from {}", name, resource.url());
        materialize(self, name, bytes, provenance)
    }

    fn find_resource(&self, path: &str) -> io::Result<Option<Resource>> {
        self.resources.locate(path)
    }

    fn namespace(&self, name: &str) -> Option<Arc<Namespace>> {
        self.namespaces.get(name).map(|entry| entry.clone())
    }

    fn define_namespace(
        &self,
        name: &str,
        manifest: Option<&ContainerManifest>,
        origin: Option<&Url>,
    ) -> Result<Arc<Namespace>, RuntimeError> {
        let namespace = self
            .namespaces
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("Registering namespace {}", name);
                Arc::new(Namespace::from_manifest(name, manifest, origin))
            })
            .clone();
        Ok(namespace)
    }

    fn define_unit(
        &self,
        name: &str,
        bytes: Vec<u8>,
        provenance: Option<Provenance>,
    ) -> Result<Arc<Unit>, RuntimeError> {
        let header = UnitHeader::parse(&bytes)?;

        let namespace = match namespace_of(name) {
            Some(namespace) => Some(
                self.namespaces
                    .entry(namespace.to_string())
                    .or_insert_with(|| Arc::new(Namespace::bare(namespace)))
                    .clone(),
            ),
            None => None,
        };

        if let Some(namespace) = &namespace {
            if let Err(e) = namespace.check_seal(provenance.as_ref().map(Provenance::origin)) {
                warn!("Rejecting {}: {}", name, e);
                return Err(e);
            }
        }

        let digest: [u8; 32] = Sha256::digest(&bytes).into();
        let unit = Arc::new(Unit {
            name: name.to_string(),
            header,
            bytes,
            digest,
            namespace,
            provenance,
        });

        Ok(self.units.entry(name.to_string()).or_insert(unit).clone())
    }
}

impl std::fmt::Debug for UnitTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitTable")
            .field("units", &self.units.len())
            .field("namespaces", &self.namespaces.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::encode_unit;
    use crate::resource::MemoryLocator;

    fn table() -> (Arc<MemoryLocator>, UnitTable) {
        let locator = Arc::new(MemoryLocator::new());
        let table = UnitTable::new(locator.clone());
        (locator, table)
    }

    fn origin(name: &str) -> Url {
        Url::parse(&format!("file:///units/{}.rya", name)).unwrap()
    }

    #[test]
    fn test_define_unit() {
        let (_, table) = table();
        let bytes = encode_unit(0, b"body");

        let unit = table.define_unit("a.b.C", bytes.clone(), None).unwrap();
        assert_eq!(unit.name(), "a.b.C");
        assert_eq!(unit.bytes(), bytes.as_slice());
        assert_eq!(unit.namespace().unwrap().name(), "a.b");
        assert_eq!(unit.digest_hex().len(), 64);
        assert_eq!(table.unit_count(), 1);
        assert_eq!(table.namespace_count(), 1);
    }

    #[test]
    fn test_malformed_unit_rejected() {
        let (_, table) = table();
        let result = table.define_unit("a.B", b"nope".to_vec(), None);
        assert!(matches!(result, Err(RuntimeError::Malformed(_))));
        assert!(!table.contains("a.B"));
    }

    #[test]
    fn test_first_definition_wins() {
        let (_, table) = table();
        let first = table.define_unit("a.B", encode_unit(0, b"one"), None).unwrap();
        let second = table.define_unit("a.B", encode_unit(0, b"two"), None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.bytes().ends_with(b"one"));
    }

    #[test]
    fn test_namespace_registered_once() {
        let (_, table) = table();
        let manifest =
            ContainerManifest::from_str("[package]\nname = \"w\"\nversion = \"1.0.0\"\n").unwrap();

        let first = table
            .define_namespace("w.core", Some(&manifest), Some(&origin("w")))
            .unwrap();
        let second = table.define_namespace("w.core", None, None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.attributes().version.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_sealed_namespace_rejects_foreign_origin() {
        let (_, table) = table();
        let manifest =
            ContainerManifest::from_str("[package]\nname = \"w\"\nsealed = true\n").unwrap();
        let namespace = table
            .define_namespace("w.core", Some(&manifest), Some(&origin("w")))
            .unwrap();
        assert!(namespace.is_sealed());

        let foreign = Provenance::new(origin("other"), Vec::new(), None);
        let result = table.define_unit("w.core.Button", encode_unit(0, &[]), Some(foreign));
        assert!(matches!(result, Err(RuntimeError::SealingViolation { .. })));

        let home = Provenance::new(origin("w"), Vec::new(), None);
        assert!(table.define_unit("w.core.Button", encode_unit(0, &[]), Some(home)).is_ok());
    }

    #[test]
    fn test_load_native() {
        let (locator, table) = table();
        locator.insert("std/io/File.ryb", encode_unit(0, b"file"));

        let unit = table.load_native("std.io.File").unwrap();
        assert!(unit.provenance().is_none());
        let again = table.load_native("std.io.File").unwrap();
        assert!(Arc::ptr_eq(&unit, &again));

        assert!(matches!(
            table.load_native("std.io.Missing"),
            Err(RuntimeError::NotFound(_))
        ));
    }

    #[test]
    fn test_materialize_without_provenance_skips_manifest() {
        let (_, table) = table();
        materialize(&table, "x.y.Z", encode_unit(0, &[]), None).unwrap();
        let namespace = table.namespace("x.y").unwrap();
        assert!(namespace.origin().is_none());
    }
}
