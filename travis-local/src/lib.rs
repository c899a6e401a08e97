//! Run a Travis CI build matrix locally
//!
//! Every job of the matrix computed by `convenient-travis` is baked into its
//! own image and run in a container through `convenient-docker`:
//!
//! 1. **Staging**: tracked sources, recipe and entry point land in the work dir
//! 2. **Building**: the image is built with a progress bar
//! 3. **Network and services**: a fresh network, sidecar services waited on
//! 4. **Running**: the job container runs with cache volumes mounted
//! 5. **Cleanup**: services and network are released, success or not
//!
//! ## Usage
//!
//! ```no_run
//! use convenient_docker::ContainerDriver;
//! use convenient_travis::{MatrixBuilder, TravisProject};
//! use travis_local::config::{ExecutorConfig, ServiceConfig};
//! use travis_local::executor::BuildExecutor;
//! use travis_local::services::ServiceCatalog;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let project = TravisProject::load(".").await?;
//! let mut executor = BuildExecutor::new(
//!     ExecutorConfig::default(),
//!     ContainerDriver::system(None),
//!     ServiceCatalog::travis(),
//!     ServiceConfig::default(),
//! );
//! for job in project.jobs(&MatrixBuilder::default())? {
//!     let report = executor.execute(&job).await;
//!     println!("{}: {}", job, report.passed());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod executor;
pub mod naming;
pub mod progress;
pub mod recipe;
pub mod services;
pub mod staging;
pub mod summary;

pub use config::{ExecutorConfig, ServiceConfig};
pub use executor::{BuildExecutor, BuildState, JobError, JobOutcome, JobReport};
pub use services::{ServiceCatalog, ServiceDefinition, ServiceError, ServiceManager};
pub use staging::{StagedJob, StagingError, Workspace};
pub use summary::RunSummary;
