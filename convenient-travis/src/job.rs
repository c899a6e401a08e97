//! A single matrix cell
//!
//! Jobs are plain data. The only mutable bit, `allowed_failure`, is flipped
//! by the matrix builder while it applies `matrix.allow_failures`; once the
//! job list is handed out it is never touched again.

use crate::env::Environment;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Length of the job fingerprint in hex characters
const ID_LENGTH: usize = 8;

/// Script phase of a Travis job, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// `before_install`
    BeforeInstall,
    /// `install`
    Install,
    /// `before_script`
    BeforeScript,
    /// `script`
    Script,
}

impl Phase {
    /// All phases in the order they run
    pub const ALL: [Phase; 4] = [
        Phase::BeforeInstall,
        Phase::Install,
        Phase::BeforeScript,
        Phase::Script,
    ];

    /// Key of the phase in `.travis.yml`
    pub fn config_key(self) -> &'static str {
        match self {
            Phase::BeforeInstall => "before_install",
            Phase::Install => "install",
            Phase::BeforeScript => "before_script",
            Phase::Script => "script",
        }
    }

    /// Stage label printed in front of each command
    pub fn label(self) -> &'static str {
        match self {
            Phase::BeforeInstall => "before install",
            Phase::Install => "install",
            Phase::BeforeScript => "before script",
            Phase::Script => "script",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Shell commands of the four script phases
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptPhases {
    before_install: Vec<String>,
    install: Vec<String>,
    before_script: Vec<String>,
    script: Vec<String>,
}

impl ScriptPhases {
    /// Replace the commands of one phase
    pub fn with(mut self, phase: Phase, commands: Vec<String>) -> Self {
        *self.commands_mut(phase) = commands;
        self
    }

    /// Commands of one phase
    pub fn commands(&self, phase: Phase) -> &[String] {
        match phase {
            Phase::BeforeInstall => &self.before_install,
            Phase::Install => &self.install,
            Phase::BeforeScript => &self.before_script,
            Phase::Script => &self.script,
        }
    }

    fn commands_mut(&mut self, phase: Phase) -> &mut Vec<String> {
        match phase {
            Phase::BeforeInstall => &mut self.before_install,
            Phase::Install => &mut self.install,
            Phase::BeforeScript => &mut self.before_script,
            Phase::Script => &mut self.script,
        }
    }

    /// Every command tagged with its phase, in execution order
    pub fn iter(&self) -> impl Iterator<Item = (Phase, &str)> {
        Phase::ALL.into_iter().flat_map(move |phase| {
            self.commands(phase)
                .iter()
                .map(move |command| (phase, command.as_str()))
        })
    }

    /// True when no phase has any command
    pub fn is_empty(&self) -> bool {
        Phase::ALL.iter().all(|phase| self.commands(*phase).is_empty())
    }
}

/// One fully specified (version × environment) build unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    id: String,
    project_name: String,
    project_dir: PathBuf,
    version: String,
    env: Environment,
    phases: ScriptPhases,
    cache_dirs: Vec<String>,
    services: Vec<String>,
    allowed_failure: bool,
}

impl Job {
    /// Create a job; the id is derived from `version` and `env`
    pub fn new(
        project_name: impl Into<String>,
        project_dir: impl Into<PathBuf>,
        version: impl Into<String>,
        env: Environment,
        phases: ScriptPhases,
        cache_dirs: Vec<String>,
        services: Vec<String>,
    ) -> Self {
        let version = version.into();
        Self {
            id: Self::fingerprint(&version, &env),
            project_name: project_name.into(),
            project_dir: project_dir.into(),
            version,
            env,
            phases,
            cache_dirs,
            services,
            allowed_failure: false,
        }
    }

    fn fingerprint(version: &str, env: &Environment) -> String {
        let mut hasher = Sha256::new();
        hasher.update(version.as_bytes());
        hasher.update(serde_json::to_string(env).unwrap_or_default().as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        digest[..ID_LENGTH].to_string()
    }

    /// Short deterministic fingerprint of version and environment
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Project name from the manifest
    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Source tree being built
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Normalized runtime version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Job environment
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Canonical environment line
    pub fn env_line(&self) -> String {
        self.env.line()
    }

    /// Script phases
    pub fn phases(&self) -> &ScriptPhases {
        &self.phases
    }

    /// Cache directory templates, may reference `$HOME`
    pub fn cache_dirs(&self) -> &[String] {
        &self.cache_dirs
    }

    /// Required sidecar services
    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Whether a failure of this job is tolerated
    pub fn is_allowed_failure(&self) -> bool {
        self.allowed_failure
    }

    pub(crate) fn mark_allowed_failure(&mut self) {
        self.allowed_failure = true;
    }

    /// Human readable `php:<version> <env>` label
    pub fn label(&self) -> String {
        let env_line = self.env_line();
        if env_line.is_empty() {
            format!("php:{}", self.version)
        } else {
            format!("php:{} {}", self.version, env_line)
        }
    }

    /// Image reference the job is built into, `<project>:v<id>`
    pub fn image_ref(&self) -> String {
        format!("{}:v{}", self.project_name, self.id).to_lowercase()
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
