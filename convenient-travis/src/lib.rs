//! Travis CI build matrix expansion
//!
//! Turns a project's `.travis.yml` into the ordered list of independent
//! [`Job`]s a hosted Travis worker would run:
//!
//! - **Versions**: the `php` axis, normalized by [`format_version`]
//! - **Environments**: the `env` / `env.matrix` axis, parsed by [`Environment`]
//! - **Overrides**: `matrix.include`, `matrix.exclude`, `matrix.allow_failures`
//!
//! ## Usage
//!
//! ```no_run
//! use convenient_travis::{MatrixBuilder, TravisProject};
//! # async fn example() -> Result<(), convenient_travis::ConfigError> {
//! let project = TravisProject::load(".").await?;
//! let jobs = project.jobs(&MatrixBuilder::default())?;
//! for job in &jobs {
//!     println!("{}", job.label());
//! }
//! # Ok(())
//! # }
//! ```

pub mod env;
pub mod error;
pub mod job;
pub mod matrix;
pub mod project;
pub mod version;

pub use env::Environment;
pub use error::{ConfigError, ConfigResult};
pub use job::{Job, Phase, ScriptPhases};
pub use matrix::{DEFAULT_VERSION, JobFilter, MatrixBuilder};
pub use project::TravisProject;
pub use version::format_version;
