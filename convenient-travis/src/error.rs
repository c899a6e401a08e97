//! Configuration errors
//!
//! Every variant is fatal and reported before any container is touched.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or expanding a Travis configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The project has no `.travis.yml`
    #[error("The .travis.yml was not found in {0}")]
    MissingConfig(PathBuf),

    /// The project has no `composer.json`
    #[error("The composer.json was not found in {0}")]
    MissingManifest(PathBuf),

    /// File system I/O error
    #[error("IO error reading {0}: {1}")]
    IoError(PathBuf, String),

    /// YAML or JSON parsing error
    #[error("Parse error in {0}: {1}")]
    ParseError(PathBuf, String),

    /// The manifest does not carry a `name`
    #[error("The composer.json in {0} does not declare a project name")]
    MissingProjectName(PathBuf),

    /// A `matrix.include` entry without a version
    #[error("Missing php version for matrix.{section}.{index}: {entry}")]
    MissingVersion {
        /// Matrix section the entry belongs to
        section: &'static str,
        /// Position of the entry within the section
        index: usize,
        /// The offending entry, serialized for the message
        entry: String,
    },

    /// A key holds a value of the wrong shape
    #[error("Invalid value for {key}: expected {expected}")]
    InvalidValue {
        /// Dotted path of the key
        key: String,
        /// Human readable description of the accepted shape
        expected: &'static str,
    },
}

/// Result alias used throughout the crate
pub type ConfigResult<T> = Result<T, ConfigError>;
