//! Build matrix expansion
//!
//! Expands the `php` × `env` axes into a grid of jobs keyed by
//! (normalized version, canonical env line), then applies the overrides of
//! the `matrix` section in the order Travis does:
//!
//! 1. `include` adds (or replaces) explicit cells
//! 2. `exclude` removes every cell its matcher accepts
//! 3. `allow_failures` flags every cell its matcher accepts
//!
//! The grid is flattened ordered by version, then by insertion order.

use crate::env::Environment;
use crate::error::{ConfigError, ConfigResult};
use crate::job::{Job, Phase, ScriptPhases};
use crate::version::{format_version, version_from_value};
use indexmap::IndexMap;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Version used when the configuration has no `php` key
pub const DEFAULT_VERSION: &str = "7.1";

/// Jobs grouped by version, then by canonical env line
type Grid = BTreeMap<String, IndexMap<String, Job>>;

/// Expands a parsed `.travis.yml` into an ordered job list
#[derive(Debug, Clone)]
pub struct MatrixBuilder {
    default_version: String,
}

impl Default for MatrixBuilder {
    fn default() -> Self {
        Self {
            default_version: DEFAULT_VERSION.to_string(),
        }
    }
}

/// Settings shared by every job of a project
struct JobTemplate<'a> {
    project_name: &'a str,
    project_dir: &'a Path,
    phases: ScriptPhases,
    cache_dirs: Vec<String>,
    services: Vec<String>,
}

impl JobTemplate<'_> {
    fn job(&self, version: &str, env_line: &str) -> Job {
        Job::new(
            self.project_name,
            self.project_dir,
            version,
            Environment::parse(env_line),
            self.phases.clone(),
            self.cache_dirs.clone(),
            self.services.clone(),
        )
    }
}

impl MatrixBuilder {
    /// Builder with the stock default version
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the version used when `php` is absent
    pub fn with_default_version(mut self, version: impl AsRef<str>) -> Self {
        self.default_version = format_version(version.as_ref());
        self
    }

    /// Expand the configuration of one project into its jobs
    pub fn compute_jobs(
        &self,
        project_name: &str,
        project_dir: &Path,
        config: &Value,
    ) -> ConfigResult<Vec<Job>> {
        let mut phases = ScriptPhases::default();
        for phase in Phase::ALL {
            let key = phase.config_key();
            phases = phases.with(phase, string_list(lookup(config, &[key]), key)?);
        }

        let template = JobTemplate {
            project_name,
            project_dir,
            phases,
            cache_dirs: string_list(lookup(config, &["cache", "directories"]), "cache.directories")?,
            services: string_list(lookup(config, &["services"]), "services")?,
        };

        let env_lines = env_axis(config)?;
        let mut grid = Grid::new();
        for version in self.version_axis(config)? {
            for env_line in &env_lines {
                insert(&mut grid, template.job(&version, env_line));
            }
        }

        let section = config.get("matrix").or_else(|| config.get("jobs"));

        for (index, entry) in entries(section, "include")?.into_iter().enumerate() {
            let version = entry
                .get("php")
                .map(|v| version_from_value(v, "matrix.include.php"))
                .transpose()?
                .flatten()
                .ok_or_else(|| ConfigError::MissingVersion {
                    section: "include",
                    index,
                    entry: serde_json::to_string(entry).unwrap_or_default(),
                })?;
            let env_line = entry_env(entry, "matrix.include.env")?.unwrap_or_default();
            insert(&mut grid, template.job(&version, &env_line));
        }

        for entry in entries(section, "exclude")? {
            let matcher = JobMatcher::from_entry(entry, "exclude")?;
            for jobs in grid.values_mut() {
                jobs.retain(|_, job| !matcher.matches(job));
            }
        }
        grid.retain(|_, jobs| !jobs.is_empty());

        for entry in entries(section, "allow_failures")? {
            let matcher = JobMatcher::from_entry(entry, "allow_failures")?;
            grid.values_mut()
                .flat_map(IndexMap::values_mut)
                .filter(|job| matcher.matches(job))
                .for_each(Job::mark_allowed_failure);
        }

        let jobs: Vec<Job> = grid.into_values().flat_map(IndexMap::into_values).collect();
        debug!("Expanded build matrix of {} into {} jobs", project_name, jobs.len());
        Ok(jobs)
    }

    fn version_axis(&self, config: &Value) -> ConfigResult<Vec<String>> {
        let versions = match lookup(config, &["php"]) {
            None | Some(Value::Null) => vec![self.default_version.clone()],
            Some(Value::Sequence(items)) => {
                let mut versions = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(version) = version_from_value(item, "php")? {
                        versions.push(version);
                    }
                }
                versions
            }
            Some(value) => version_from_value(value, "php")?.into_iter().collect(),
        };
        Ok(versions)
    }
}

fn insert(grid: &mut Grid, job: Job) {
    let _ = grid
        .entry(job.version().to_string())
        .or_default()
        .insert(job.env_line(), job);
}

/// Selects jobs by version and env line, `None` meaning "any"
#[derive(Debug, Clone, PartialEq, Eq)]
struct JobMatcher {
    version: Option<String>,
    env_line: Option<String>,
}

impl JobMatcher {
    fn from_entry(entry: &Value, section: &str) -> ConfigResult<Self> {
        let version = entry
            .get("php")
            .map(|v| version_from_value(v, &format!("matrix.{section}.php")))
            .transpose()?
            .flatten();
        let env_line = entry_env(entry, &format!("matrix.{section}.env"))?;
        Ok(Self { version, env_line })
    }

    fn matches(&self, job: &Job) -> bool {
        let version_ok = self.version.as_deref().is_none_or(|v| v == job.version());
        let env_ok = self.env_line.as_deref().is_none_or(|e| e == job.env_line());
        version_ok && env_ok
    }
}

/// Canonical env line of a matrix entry
///
/// `None` when the entry has no `env` key, `Some("")` for an explicit null.
fn entry_env(entry: &Value, key: &str) -> ConfigResult<Option<String>> {
    match entry.get("env") {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(String::new())),
        Some(Value::String(line)) => Ok(Some(Environment::parse(line).line())),
        Some(_) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            expected: "an environment line",
        }),
    }
}

/// Entries of one matrix override list
fn entries<'a>(section: Option<&'a Value>, name: &'static str) -> ConfigResult<Vec<&'a Value>> {
    match section.and_then(|s| s.get(name)) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(items)) => {
            for item in items {
                if !item.is_mapping() {
                    return Err(ConfigError::InvalidValue {
                        key: format!("matrix.{name}"),
                        expected: "a list of {php, env} maps",
                    });
                }
            }
            Ok(items.iter().collect())
        }
        Some(_) => Err(ConfigError::InvalidValue {
            key: format!("matrix.{name}"),
            expected: "a list of {php, env} maps",
        }),
    }
}

/// The env axis: `env.matrix`, else a plain `env` list or line, else one empty line
fn env_axis(config: &Value) -> ConfigResult<Vec<String>> {
    let axis = match lookup(config, &["env"]) {
        None | Some(Value::Null) => None,
        Some(Value::Mapping(env)) => env.get("matrix"),
        Some(value) => Some(value),
    };

    match axis {
        None | Some(Value::Null) => Ok(vec![String::new()]),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| match item {
                Value::Null => Ok(String::new()),
                other => scalar(other).ok_or_else(|| ConfigError::InvalidValue {
                    key: "env.matrix".to_string(),
                    expected: "a list of environment lines",
                }),
            })
            .collect(),
        Some(value) => scalar(value).map(|line| vec![line]).ok_or_else(|| ConfigError::InvalidValue {
            key: "env".to_string(),
            expected: "an environment line or a list of them",
        }),
    }
}

fn lookup<'a>(config: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(config, |value, key| value.get(*key))
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A list of strings where a single scalar counts as a one element list
fn string_list(value: Option<&Value>, key: &str) -> ConfigResult<Vec<String>> {
    let invalid = || ConfigError::InvalidValue {
        key: key.to_string(),
        expected: "a string or a list of strings",
    };

    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(items)) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(|item| scalar(item).ok_or_else(invalid))
            .collect(),
        Some(other) => scalar(other).map(|s| vec![s]).ok_or_else(invalid),
    }
}

/// Narrows a job list by version and env substring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    version: Option<String>,
    env: Option<String>,
}

impl JobFilter {
    /// Filter accepting every job
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only jobs of this version (normalized before comparing)
    pub fn version(mut self, version: impl AsRef<str>) -> Self {
        self.version = Some(format_version(version.as_ref()));
        self
    }

    /// Keep only jobs whose env line contains `fragment`
    pub fn env_contains(mut self, fragment: impl Into<String>) -> Self {
        self.env = Some(fragment.into());
        self
    }

    /// Whether `job` passes the filter
    pub fn matches(&self, job: &Job) -> bool {
        self.version.as_deref().is_none_or(|v| v == job.version())
            && self.env.as_deref().is_none_or(|e| job.env_line().contains(e))
    }

    /// Keep the matching jobs, preserving order
    pub fn apply(&self, jobs: Vec<Job>) -> Vec<Job> {
        jobs.into_iter().filter(|job| self.matches(job)).collect()
    }
}
