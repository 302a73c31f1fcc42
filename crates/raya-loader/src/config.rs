//! Loader configuration (`raya-loader.toml`)

use crate::archive::ArchiveError;
use crate::loader::TransformingLoader;
use crate::patch::PatchRegistry;
use crate::resource::SearchPath;
use crate::runtime::UnitTable;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Default configuration file name
pub const CONFIG_FILE: &str = "raya-loader.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A search-path archive could not be opened
    #[error("Search path error: {0}")]
    Archive(#[from] ArchiveError),
}

/// Loader configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct LoaderConfig {
    /// Directories and unit archives, searched in order
    pub search_path: Vec<PathBuf>,

    /// Extra load-exemption prefixes
    pub load_exemptions: Vec<String>,

    /// Transform-exemption prefixes
    pub transform_exemptions: Vec<String>,

    /// Serialize concurrent resolutions of the same name
    pub single_flight: bool,

    /// Poison names whose provenance cannot be extracted
    pub strict_provenance: bool,
}

impl LoaderConfig {
    /// Load configuration from a file.
    ///
    /// Relative search-path entries are resolved against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        if let Some(base) = path.parent() {
            config.search_path = config
                .search_path
                .into_iter()
                .map(|entry| if entry.is_relative() { base.join(entry) } else { entry })
                .collect();
        }
        Ok(config)
    }

    /// Parse configuration from TOML
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Build a loader, backed by a fresh [`UnitTable`] that shares the same
    /// search path.
    pub fn build(
        &self,
        patches: Arc<PatchRegistry>,
    ) -> Result<(TransformingLoader, Arc<UnitTable>), ConfigError> {
        let search_path = Arc::new(SearchPath::from_paths(&self.search_path)?);
        let runtime = Arc::new(UnitTable::new(search_path.clone()));

        let mut builder = TransformingLoader::builder(search_path, runtime.clone())
            .patches(patches)
            .single_flight(self.single_flight)
            .strict_provenance(self.strict_provenance);
        for prefix in &self.load_exemptions {
            builder = builder.load_exemption(prefix.as_str());
        }
        for prefix in &self.transform_exemptions {
            builder = builder.transform_exemption(prefix.as_str());
        }

        Ok((builder.build(), runtime))
    }
}
