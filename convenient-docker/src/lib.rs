//! Docker command boundary
//!
//! Everything the build tool does to the container runtime goes through
//! [`ContainerDriver`]: image builds, job and service containers, cache
//! volumes, networks and the label-scoped inspection used by cleanup.
//!
//! - **Process boundary**: [`ProcessRunner`] spawns an [`Invocation`] and
//!   returns a [`RuntimeProcess`] that streams output lines while it runs
//! - **Marker label**: every object created carries [`MARKER_LABEL`], and
//!   listing only ever looks at objects carrying it
//! - **Networks**: [`NetworkProvisioner`] recreates the per-job network on
//!   the lowest free `10.X.0.0/16`
//!
//! ## Usage
//!
//! ```no_run
//! use convenient_docker::ContainerDriver;
//! # async fn example() -> convenient_docker::DriverResult<()> {
//! let driver = ContainerDriver::system(None);
//! for id in driver.list_tagged_image_ids().await? {
//!     let image = driver.inspect_image(&id).await?;
//!     println!("{} {}", image.id, image.tag);
//! }
//! # Ok(())
//! # }
//! ```

pub mod driver;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod inspect;
pub mod network;
pub mod process;

pub use driver::{ContainerDriver, MARKER_LABEL, VolumeMount};
pub use error::{DriverError, DriverResult};
pub use inspect::{ImageDetails, NetworkDetails};
pub use network::NetworkProvisioner;
pub use process::{
    Invocation, LineSink, OutputLine, OutputMode, ProcessOutcome, ProcessRunner, RuntimeProcess, Stream,
    TokioProcessRunner,
};
