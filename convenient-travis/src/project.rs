//! Project loading
//!
//! A buildable project is a directory with a `.travis.yml` and a
//! `composer.json` naming the project.

use crate::error::{ConfigError, ConfigResult};
use crate::job::Job;
use crate::matrix::MatrixBuilder;
use serde::Deserialize;
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tracing::info;

/// Name of the CI configuration file
pub const CONFIG_FILE: &str = ".travis.yml";

/// Name of the manifest supplying the project name
pub const MANIFEST_FILE: &str = "composer.json";

#[derive(Debug, Deserialize)]
struct ComposerManifest {
    name: Option<String>,
}

/// A project directory with its parsed CI configuration
#[derive(Debug, Clone)]
pub struct TravisProject {
    /// Project name from the manifest
    pub name: String,
    /// Project root
    pub dir: PathBuf,
    /// Parsed `.travis.yml`
    pub config: Value,
}

impl TravisProject {
    /// Load the configuration and manifest of the project at `dir`
    pub async fn load(dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let dir = dir.as_ref().to_path_buf();

        let config_path = dir.join(CONFIG_FILE);
        if !tokio::fs::try_exists(&config_path).await.unwrap_or(false) {
            return Err(ConfigError::MissingConfig(dir));
        }

        let manifest_path = dir.join(MANIFEST_FILE);
        if !tokio::fs::try_exists(&manifest_path).await.unwrap_or(false) {
            return Err(ConfigError::MissingManifest(dir));
        }

        let content = read(&config_path).await?;
        let config: Value = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(config_path.clone(), e.to_string()))?;

        let manifest: ComposerManifest = serde_json::from_str(&read(&manifest_path).await?)
            .map_err(|e| ConfigError::ParseError(manifest_path.clone(), e.to_string()))?;
        let name = manifest
            .name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingProjectName(dir.clone()))?;

        info!("Loaded {} from {}", name, config_path.display());

        Ok(Self { name, dir, config })
    }

    /// Expand the project's build matrix
    pub fn jobs(&self, builder: &MatrixBuilder) -> ConfigResult<Vec<Job>> {
        builder.compute_jobs(&self.name, &self.dir, &self.config)
    }
}

async fn read(path: &Path) -> ConfigResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))
}
