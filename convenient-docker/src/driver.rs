//! Docker command boundary
//!
//! [`ContainerDriver`] builds one `docker` command line per operation and
//! runs it through the injected [`ProcessRunner`]. Nothing here retries;
//! callers decide what a failure means.

use crate::error::{DriverError, DriverResult};
use crate::inspect::{ImageDetails, NetworkDetails};
use crate::process::{Invocation, LineSink, ProcessOutcome, ProcessRunner, RuntimeProcess, TokioProcessRunner};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Label put on every image, volume, network and service container
pub const MARKER_LABEL: &str = "org.travis-local.build";

/// Executable name looked up on `PATH`
const EXECUTABLE: &str = "docker";

/// Used when `PATH` has no `docker`
const FALLBACK_EXECUTABLE: &str = "/usr/bin/docker";

/// Bind or named volume mount, `source:target`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    /// Volume name or host path
    pub source: String,
    /// Path inside the container
    pub target: String,
}

impl VolumeMount {
    /// Mount `source` at `target`
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Thin async wrapper over the `docker` CLI
#[derive(Debug, Clone)]
pub struct ContainerDriver {
    executable: PathBuf,
    marker: String,
    runner: Arc<dyn ProcessRunner>,
}

impl ContainerDriver {
    /// Driver for `executable` using `runner`
    pub fn new(executable: impl Into<PathBuf>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            executable: executable.into(),
            marker: MARKER_LABEL.to_string(),
            runner,
        }
    }

    /// Driver spawning real processes, locating `docker` unless given
    pub fn system(executable: Option<PathBuf>) -> Self {
        Self::new(
            executable.unwrap_or_else(Self::locate),
            Arc::new(TokioProcessRunner),
        )
    }

    /// Use another marker label
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    /// Find `docker` on `PATH`, falling back to `/usr/bin/docker`
    pub fn locate() -> PathBuf {
        std::env::var_os("PATH")
            .and_then(|paths| {
                std::env::split_paths(&paths)
                    .map(|dir| dir.join(EXECUTABLE))
                    .find(|candidate| candidate.is_file())
            })
            .unwrap_or_else(|| PathBuf::from(FALLBACK_EXECUTABLE))
    }

    /// Path of the runtime executable
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Marker label
    pub fn marker(&self) -> &str {
        &self.marker
    }

    fn invocation<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new(&self.executable).args(args)
    }

    fn marker_flag(&self) -> String {
        format!("{}=true", self.marker)
    }

    async fn spawn(&self, invocation: &Invocation) -> DriverResult<Box<dyn RuntimeProcess>> {
        debug!("{}", invocation);
        self.runner.spawn(invocation).await
    }

    /// Run to completion, streaming lines, without judging the exit code
    async fn stream(&self, invocation: &Invocation, on_line: LineSink<'_>) -> DriverResult<ProcessOutcome> {
        let mut process = self.spawn(invocation).await?;
        process.wait(on_line).await
    }

    /// Run to completion and fail on a non-zero exit
    async fn execute(&self, invocation: Invocation) -> DriverResult<ProcessOutcome> {
        let outcome = self.stream(&invocation, &mut |_| {}).await?;
        checked(&invocation, outcome)
    }

    /// `docker build [--no-cache] -t <tag> -f <buildfile> .` inside the buildfile's directory
    pub async fn build_image(
        &self,
        tag: &str,
        buildfile: &Path,
        no_cache: bool,
        on_line: LineSink<'_>,
    ) -> DriverResult<ProcessOutcome> {
        let file_name = buildfile
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let context = buildfile.parent().unwrap_or_else(|| Path::new("."));

        let mut invocation = self.invocation(["build"]);
        if no_cache {
            invocation = invocation.arg("--no-cache");
        }
        let invocation = invocation
            .args(["-t", tag, "-f", file_name.as_str(), "."])
            .current_dir(context);

        info!("Building image {}", tag);
        let outcome = self.stream(&invocation, on_line).await?;
        checked(&invocation, outcome)
    }

    /// `docker run --rm [-v src:dst]... --network <net> <image> [command...]`
    ///
    /// A non-zero exit of the container is reported in the outcome, not as an error.
    pub async fn run_container(
        &self,
        image: &str,
        volumes: &[VolumeMount],
        network: &str,
        command: &[String],
        on_line: LineSink<'_>,
    ) -> DriverResult<ProcessOutcome> {
        let mut invocation = self.invocation(["run", "--rm"]);
        for volume in volumes {
            invocation = invocation.args(["-v".to_string(), format!("{}:{}", volume.source, volume.target)]);
        }
        let invocation = invocation
            .args(["--network", network, image])
            .args(command.iter().cloned());

        self.stream(&invocation, on_line).await
    }

    /// Start a short-lived container named `name` on `network` and hand back its process
    pub async fn spawn_container(
        &self,
        image: &str,
        network: &str,
        name: &str,
        command: &[String],
    ) -> DriverResult<Box<dyn RuntimeProcess>> {
        let invocation = self
            .invocation(["run", "--rm", "--name", name, "--network", network, image])
            .args(command.iter().cloned());
        self.spawn(&invocation).await
    }

    /// Start a named, labelled service container reachable as `alias`
    ///
    /// The container runs in the background; its output is discarded.
    pub async fn start_service_container(
        &self,
        image: &str,
        network: &str,
        alias: &str,
        name: &str,
        env: &[(String, String)],
    ) -> DriverResult<Box<dyn RuntimeProcess>> {
        let mut invocation = self.invocation([
            "run",
            "--rm",
            "--name",
            name,
            "--network",
            network,
            "--network-alias",
            alias,
            "--label",
        ]);
        invocation = invocation.arg(self.marker_flag());
        for (key, value) in env {
            invocation = invocation.args(["-e".to_string(), format!("{key}={value}")]);
        }
        let invocation = invocation.arg(image).discard_output();

        self.spawn(&invocation).await
    }

    /// Stop a process started by this driver
    pub async fn stop_container(&self, process: &mut dyn RuntimeProcess) -> DriverResult<()> {
        process.stop().await
    }

    /// `docker volume create --label <marker>=true <name>`
    pub async fn create_volume(&self, name: &str) -> DriverResult<()> {
        let invocation = self
            .invocation(["volume", "create", "--label"])
            .arg(self.marker_flag())
            .arg(name);
        let _ = self.execute(invocation).await?;
        Ok(())
    }

    /// `docker network create --label <marker>=true --subnet <subnet> <name>`
    pub async fn create_network(&self, name: &str, subnet: &str) -> DriverResult<()> {
        let invocation = self
            .invocation(["network", "create", "--label"])
            .arg(self.marker_flag())
            .args(["--subnet", subnet, name]);
        let _ = self.execute(invocation).await?;
        Ok(())
    }

    /// `docker network rm <name>`
    pub async fn remove_network(&self, name: &str) -> DriverResult<()> {
        let _ = self.execute(self.invocation(["network", "rm", name])).await?;
        Ok(())
    }

    /// `docker rm --force <name>`
    pub async fn kill_and_remove(&self, name: &str) -> DriverResult<()> {
        let _ = self.execute(self.invocation(["rm", "--force", name])).await?;
        Ok(())
    }

    fn execute_blocking(&self, invocation: Invocation) -> DriverResult<()> {
        debug!("{}", invocation);
        match self.runner.run_blocking(&invocation)? {
            Some(0) => Ok(()),
            status => Err(DriverError::CommandFailed {
                command: invocation.to_string(),
                status,
                output: String::new(),
            }),
        }
    }

    /// `docker rm --force <name>` without an async runtime
    pub fn kill_and_remove_blocking(&self, name: &str) -> DriverResult<()> {
        self.execute_blocking(self.invocation(["rm", "--force", name]).discard_output())
    }

    /// `docker network rm <name>` without an async runtime
    pub fn remove_network_blocking(&self, name: &str) -> DriverResult<()> {
        self.execute_blocking(self.invocation(["network", "rm", name]).discard_output())
    }

    /// `docker rmi --force <id>`
    pub async fn remove_image(&self, id: &str) -> DriverResult<()> {
        let _ = self.execute(self.invocation(["rmi", "--force", id])).await?;
        Ok(())
    }

    /// Ids of images carrying the marker label, deduplicated in listing order
    pub async fn list_tagged_image_ids(&self) -> DriverResult<Vec<String>> {
        let invocation = self
            .invocation(["images", "-q", "--filter"])
            .arg(format!("label={}", self.marker));
        let outcome = self.execute(invocation).await?;
        Ok(unique_ids(&outcome))
    }

    /// `docker image inspect <id>`
    pub async fn inspect_image(&self, id: &str) -> DriverResult<ImageDetails> {
        let outcome = self.execute(self.invocation(["image", "inspect", id])).await?;
        ImageDetails::from_inspect(&stdout(&outcome), id)
    }

    /// Ids of networks carrying the marker label
    pub async fn list_tagged_network_ids(&self) -> DriverResult<Vec<String>> {
        let invocation = self
            .invocation(["network", "ls", "-q", "--filter"])
            .arg(format!("label={}", self.marker));
        let outcome = self.execute(invocation).await?;
        Ok(unique_ids(&outcome))
    }

    /// `docker network inspect <id>`
    pub async fn inspect_network(&self, id: &str) -> DriverResult<NetworkDetails> {
        let outcome = self.execute(self.invocation(["network", "inspect", id])).await?;
        NetworkDetails::from_inspect(&stdout(&outcome), id)
    }
}

fn checked(invocation: &Invocation, outcome: ProcessOutcome) -> DriverResult<ProcessOutcome> {
    if outcome.success() {
        Ok(outcome)
    } else {
        Err(DriverError::CommandFailed {
            command: invocation.to_string(),
            status: outcome.exit_code,
            output: outcome.output(),
        })
    }
}

fn stdout(outcome: &ProcessOutcome) -> String {
    outcome.stdout_lines().collect::<Vec<_>>().join("\n")
}

fn unique_ids(outcome: &ProcessOutcome) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in outcome.stdout_lines().map(str::trim).filter(|id| !id.is_empty()) {
        if !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_string());
        }
    }
    ids
}
