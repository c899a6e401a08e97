//! Job execution
//!
//! Runs one job through a fixed sequence of states:
//!
//! ```text
//! Staging -> Building -> NetworkUp -> ServicesUp -> Running -> Cleanup -> Done
//! ```
//!
//! A failing step ends the job with [`JobOutcome::Errored`]. Once the network
//! is up, `Cleanup` runs on every path: services started for the job are
//! stopped and the network is released. Should the executor be dropped
//! mid-job (Ctrl-C), tracked services and the network are removed
//! synchronously from `Drop`.

use crate::config::{ExecutorConfig, ServiceConfig};
use crate::naming::{cache_mount_target, cache_volume_name};
use crate::progress::BuildProgress;
use crate::services::{ServiceCatalog, ServiceError, ServiceManager};
use crate::staging::{StagedJob, StagingError, Workspace};
use convenient_docker::{ContainerDriver, DriverError, NetworkProvisioner, OutputLine, Stream, VolumeMount};
use convenient_travis::Job;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a job could not produce a test result
#[derive(Debug, Error)]
pub enum JobError {
    /// Preparing the build context failed
    #[error("Staging failed: {0}")]
    Staging(#[from] StagingError),

    /// The image build failed
    #[error("Building image {image} failed")]
    Build {
        /// Image reference being built
        image: String,
        /// Captured builder output
        output: String,
    },

    /// The job network could not be created
    #[error("Network setup failed: {0}")]
    Network(#[source] DriverError),

    /// A declared service did not come up
    #[error("Service setup failed: {0}")]
    Service(#[from] ServiceError),

    /// The job container could not be run
    #[error("Running the job failed: {0}")]
    Run(#[source] DriverError),
}

/// Result of one job
#[derive(Debug)]
pub enum JobOutcome {
    /// The job script exited 0
    Passed,
    /// The job script exited non-zero
    Failed {
        /// Exit code, `None` when killed by a signal
        exit_code: Option<i32>,
    },
    /// The job never got to a result
    Errored(JobError),
}

/// A job together with its outcome
#[derive(Debug)]
pub struct JobReport {
    /// The job
    pub job: Job,
    /// What happened
    pub outcome: JobOutcome,
}

impl JobReport {
    /// Whether the job passed
    pub fn passed(&self) -> bool {
        matches!(self.outcome, JobOutcome::Passed)
    }

    /// Whether the job failed without being allowed to
    pub fn is_blocking_failure(&self) -> bool {
        !self.passed() && !self.job.is_allowed_failure()
    }
}

/// Lifecycle state of the job being executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// Copying sources and writing the recipe
    Staging,
    /// Building the job image
    Building,
    /// Creating the job network
    NetworkUp,
    /// Starting declared services
    ServicesUp,
    /// Running the job container
    Running,
    /// Tearing services and network down
    Cleanup,
    /// Result is final
    Done,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildState::Staging => "staging",
            BuildState::Building => "building",
            BuildState::NetworkUp => "network-up",
            BuildState::ServicesUp => "services-up",
            BuildState::Running => "running",
            BuildState::Cleanup => "cleanup",
            BuildState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Builds and runs jobs one after another
#[derive(Debug)]
pub struct BuildExecutor {
    config: ExecutorConfig,
    driver: ContainerDriver,
    workspace: Workspace,
    network: NetworkProvisioner,
    services: ServiceManager,
    state: BuildState,
}

impl BuildExecutor {
    /// Executor driving `driver`, starting services from `catalog`
    ///
    /// Services join the executor's network regardless of
    /// `service_config.network_name`.
    pub fn new(
        config: ExecutorConfig,
        driver: ContainerDriver,
        catalog: ServiceCatalog,
        service_config: ServiceConfig,
    ) -> Self {
        let service_config = ServiceConfig {
            network_name: config.network_name.clone(),
            ..service_config
        };
        Self {
            workspace: Workspace::new(&config.work_dir, &config.base_image),
            network: NetworkProvisioner::new(driver.clone()),
            services: ServiceManager::new(driver.clone(), catalog, service_config),
            driver,
            config,
            state: BuildState::Done,
        }
    }

    /// State of the current (or last) job
    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Services still running
    pub fn tracked_services(&self) -> Vec<(String, String)> {
        self.services.tracked()
    }

    fn transition(&mut self, job: &Job, next: BuildState) {
        debug!("Job {}: {} -> {}", job.id(), self.state, next);
        self.state = next;
    }

    /// Execute one job to a final report
    pub async fn execute(&mut self, job: &Job) -> JobReport {
        let outcome = match self.run_job(job).await {
            Ok(Some(0)) => JobOutcome::Passed,
            Ok(exit_code) => JobOutcome::Failed { exit_code },
            Err(e) => JobOutcome::Errored(e),
        };
        self.transition(job, BuildState::Done);

        JobReport {
            job: job.clone(),
            outcome,
        }
    }

    async fn run_job(&mut self, job: &Job) -> Result<Option<i32>, JobError> {
        self.transition(job, BuildState::Staging);
        let staged = self.workspace.stage(job).await?;

        self.transition(job, BuildState::Building);
        let image = self.build(job, &staged).await?;

        self.transition(job, BuildState::NetworkUp);
        let _ = self
            .network
            .recreate(&self.config.network_name)
            .await
            .map_err(JobError::Network)?;

        let result = self.run_on_network(job, &image).await;

        self.transition(job, BuildState::Cleanup);
        self.services.stop_all().await;
        self.network.release(&self.config.network_name).await;

        result
    }

    async fn build(&self, job: &Job, staged: &StagedJob) -> Result<String, JobError> {
        let image = job.image_ref();
        info!("Building docker image for job {}", job.id());

        let progress = BuildProgress::new(staged.directives.clone(), self.config.show_progress);
        let result = self
            .driver
            .build_image(&image, &staged.recipe_path, self.config.no_cache, &mut |line| {
                progress.observe(&line.text);
            })
            .await;

        match result {
            Ok(_) => {
                progress.finish();
                info!("Successfully built image {}", image);
                Ok(image)
            }
            Err(DriverError::CommandFailed { output, .. }) => {
                progress.abandon();
                Err(JobError::Build { image, output })
            }
            Err(e) => {
                progress.abandon();
                Err(JobError::Build {
                    image,
                    output: e.to_string(),
                })
            }
        }
    }

    async fn run_on_network(&mut self, job: &Job, image: &str) -> Result<Option<i32>, JobError> {
        self.transition(job, BuildState::ServicesUp);
        for service in job.services() {
            self.services.start_service(service, job.project_name()).await?;
        }

        self.transition(job, BuildState::Running);
        let volumes = self.cache_volumes(job).await?;
        let outcome = self
            .driver
            .run_container(image, &volumes, &self.config.network_name, &[], &mut echo)
            .await
            .map_err(JobError::Run)?;

        Ok(outcome.exit_code)
    }

    /// One labelled volume per cache directory, mounted with `$HOME` as `/root`
    async fn cache_volumes(&self, job: &Job) -> Result<Vec<VolumeMount>, JobError> {
        let mut volumes: Vec<VolumeMount> = Vec::new();
        for cache_dir in job.cache_dirs() {
            let name = cache_volume_name(job.project_name(), cache_dir);
            if volumes.iter().any(|volume| volume.source == name) {
                continue;
            }
            self.driver.create_volume(&name).await.map_err(JobError::Run)?;
            volumes.push(VolumeMount::new(name, cache_mount_target(cache_dir)));
        }
        Ok(volumes)
    }
}

impl Drop for BuildExecutor {
    fn drop(&mut self) {
        let network_up = matches!(
            self.state,
            BuildState::NetworkUp | BuildState::ServicesUp | BuildState::Running | BuildState::Cleanup
        );
        if !network_up {
            return;
        }

        warn!("Job interrupted in state {}, releasing its resources", self.state);
        self.services.remove_all_blocking();
        if let Err(e) = self.driver.remove_network_blocking(&self.config.network_name) {
            warn!("Failed to remove network {}: {}", self.config.network_name, e);
        }
    }
}

fn echo(line: &OutputLine) {
    match line.stream {
        Stream::Stdout => println!("{}", line.text),
        Stream::Stderr => eprintln!("{}", line.text),
    }
}
