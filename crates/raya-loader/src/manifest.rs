//! Container manifest parsing (raya.toml inside a unit archive)
//!
//! A unit archive may carry a manifest at its root. The `[package]` table
//! describes the whole archive; `[namespaces."a.b"]` tables override those
//! attributes for a single namespace and can seal it.
//!
//! ```toml
//! [package]
//! name = "widgets"
//! version = "1.4.0"
//! vendor = "Raya Contributors"
//!
//! [namespaces."widgets.core"]
//! sealed = true
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Path of the manifest inside a unit archive
pub const MANIFEST_PATH: &str = "raya.toml";

/// Errors that can occur during manifest parsing
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Manifest is not valid UTF-8
    #[error("Manifest is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Failed to parse TOML
    #[error("Failed to parse manifest: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid manifest: {0}")]
    ValidationError(String),
}

/// Archive manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerManifest {
    /// Archive-wide attributes
    pub package: PackageAttributes,

    /// Per-namespace overrides
    #[serde(default)]
    pub namespaces: BTreeMap<String, NamespaceSection>,
}

/// Archive-wide attributes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageAttributes {
    /// Package name
    pub name: String,

    /// Package version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Human-readable title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Vendor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,

    /// Seal every namespace in the archive
    #[serde(default)]
    pub sealed: bool,
}

/// Per-namespace override section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NamespaceSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,

    /// Overrides `package.sealed` when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sealed: Option<bool>,
}

/// Effective attributes of one namespace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceAttributes {
    pub title: Option<String>,
    pub version: Option<String>,
    pub vendor: Option<String>,
    pub sealed: bool,
}

impl ContainerManifest {
    /// Parse a manifest from raw archive bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ManifestError> {
        Self::from_str(std::str::from_utf8(bytes)?)
    }

    /// Parse a manifest from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ManifestError> {
        let manifest: ContainerManifest = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the manifest
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.package.name.is_empty() {
            return Err(ManifestError::ValidationError(
                "Package name cannot be empty".to_string(),
            ));
        }

        for namespace in self.namespaces.keys() {
            if namespace.is_empty() || namespace.split('.').any(str::is_empty) {
                return Err(ManifestError::ValidationError(format!(
                    "Invalid namespace section: \"{}\"",
                    namespace
                )));
            }
        }

        Ok(())
    }

    /// Attributes for `namespace`, with the namespace section (if any)
    /// taking precedence over the package table.
    pub fn namespace_attributes(&self, namespace: &str) -> NamespaceAttributes {
        let section = self.namespaces.get(namespace);
        let pick = |own: Option<&Option<String>>, fallback: &Option<String>| {
            own.and_then(Clone::clone).or_else(|| fallback.clone())
        };

        NamespaceAttributes {
            title: pick(section.map(|s| &s.title), &self.package.title),
            version: pick(section.map(|s| &s.version), &self.package.version),
            vendor: pick(section.map(|s| &s.vendor), &self.package.vendor),
            sealed: section
                .and_then(|s| s.sealed)
                .unwrap_or(self.package.sealed),
        }
    }
}
