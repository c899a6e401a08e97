//! Executor configuration

use std::path::PathBuf;
use std::time::Duration;

/// Name of the per-job network
pub const NETWORK_NAME: &str = "travis_ci";

/// Repository of the language runtime images
pub const BASE_IMAGE: &str = "travisci/php";

/// Image polling a service port until it accepts connections
pub const WAIT_IMAGE: &str = "travisci/wait:latest";

/// Default bound on a service readiness wait
pub const READINESS_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings of a [`BuildExecutor`](crate::executor::BuildExecutor)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Root of the staged build contexts
    pub work_dir: PathBuf,
    /// Network the job and its services share
    pub network_name: String,
    /// Image repository, tagged with the job version
    pub base_image: String,
    /// Disable the layer cache of image builds
    pub no_cache: bool,
    /// Draw a progress bar while building
    pub show_progress: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            network_name: NETWORK_NAME.to_string(),
            base_image: BASE_IMAGE.to_string(),
            no_cache: false,
            show_progress: true,
        }
    }
}

/// `$TMPDIR/travis-local`
pub fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("travis-local")
}

/// Settings of a [`ServiceManager`](crate::services::ServiceManager)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Network services are attached to
    pub network_name: String,
    /// Readiness helper image
    pub wait_image: String,
    /// Bound on each readiness wait
    pub readiness_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            network_name: NETWORK_NAME.to_string(),
            wait_image: WAIT_IMAGE.to_string(),
            readiness_timeout: READINESS_TIMEOUT,
        }
    }
}
