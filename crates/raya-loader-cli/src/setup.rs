//! Loader construction from config file, flags and environment

use anyhow::Context;
use raya_loader::config::CONFIG_FILE;
use raya_loader::{LoaderConfig, PatchRegistry, TransformingLoader, UnitTable};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Environment variable with extra search-path entries
pub const UNIT_PATH_ENV: &str = "RAYA_UNIT_PATH";

/// Global options shared by every command
pub struct LoaderOptions {
    pub config: Option<PathBuf>,
    pub paths: Vec<PathBuf>,
}

impl LoaderOptions {
    /// Effective configuration: the config file (if any), then `--path`
    /// entries, then `RAYA_UNIT_PATH`.
    pub fn config(&self) -> anyhow::Result<LoaderConfig> {
        let mut config = match &self.config {
            Some(path) => LoaderConfig::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None if Path::new(CONFIG_FILE).exists() => {
                LoaderConfig::from_file(Path::new(CONFIG_FILE))
                    .with_context(|| format!("Failed to load {}", CONFIG_FILE))?
            }
            None => LoaderConfig::default(),
        };

        config.search_path.extend(self.paths.iter().cloned());
        if let Some(value) = std::env::var_os(UNIT_PATH_ENV) {
            config
                .search_path
                .extend(std::env::split_paths(&value).filter(|p| !p.as_os_str().is_empty()));
        }

        debug!("Search path: {:?}", config.search_path);
        Ok(config)
    }

    pub fn build(&self) -> anyhow::Result<(TransformingLoader, Arc<UnitTable>)> {
        let config = self.config()?;
        config
            .build(Arc::new(PatchRegistry::new()))
            .context("Failed to open search path")
    }
}
