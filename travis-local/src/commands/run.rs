//! `run` command

use colored::Colorize;
use convenient_docker::ContainerDriver;
use convenient_travis::{JobFilter, MatrixBuilder, TravisProject};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use travis_local::config::default_work_dir;
use travis_local::{
    BuildExecutor, ExecutorConfig, JobError, JobOutcome, RunSummary, ServiceCatalog, ServiceConfig,
};

/// Job selection given on the command line
#[derive(Debug, Default)]
pub struct RunOptions {
    /// `--php`
    pub php: Option<String>,
    /// `--env`
    pub env: Option<String>,
    /// `--no-cache`
    pub no_cache: bool,
}

impl RunOptions {
    /// Filter selecting the requested jobs
    pub fn filter(&self) -> JobFilter {
        let mut filter = JobFilter::new();
        if let Some(php) = &self.php {
            filter = filter.version(php);
        }
        if let Some(env) = &self.env {
            filter = filter.env_contains(env.clone());
        }
        filter
    }
}

/// Build and run the selected jobs one after another
///
/// Failing jobs end up in the summary; only configuration errors and an
/// interrupt are returned as errors.
pub async fn execute(
    project_dir: &Path,
    work_dir: Option<PathBuf>,
    docker: Option<PathBuf>,
    options: RunOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let project = TravisProject::load(project_dir).await?;
    let jobs = options.filter().apply(project.jobs(&MatrixBuilder::default())?);

    if jobs.is_empty() {
        println!("No jobs match the given filters");
        return Ok(());
    }
    info!("Running {} jobs of {}", jobs.len(), project.name);

    let config = ExecutorConfig {
        work_dir: work_dir.unwrap_or_else(default_work_dir),
        no_cache: options.no_cache,
        ..ExecutorConfig::default()
    };
    let mut executor = BuildExecutor::new(
        config,
        ContainerDriver::system(docker),
        ServiceCatalog::travis(),
        ServiceConfig::default(),
    );

    let mut summary = RunSummary::new();
    let total = jobs.len();
    for (index, job) in jobs.iter().enumerate() {
        println!();
        println!("{}", format!("[{}/{}] {}", index + 1, total, job.label()).bold().cyan());

        let report = tokio::select! {
            report = executor.execute(job) => Some(report),
            _ = tokio::signal::ctrl_c() => None,
        };

        let Some(report) = report else {
            warn!("Interrupted while running {}", job);
            drop(executor);
            return Err("interrupted".into());
        };

        if let Some(reason) = describe_failure(&report.outcome) {
            println!("{} {}: {}", "Job failed".red(), job.label(), reason);
        } else {
            println!("{} {}", "Job passed".green(), job.label());
        }
        summary.record(report);
    }

    println!();
    println!("{summary}");
    Ok(())
}

fn describe_failure(outcome: &JobOutcome) -> Option<String> {
    match outcome {
        JobOutcome::Passed => None,
        JobOutcome::Failed { exit_code: Some(code) } => Some(format!("exit code {code}")),
        JobOutcome::Failed { exit_code: None } => Some("killed by signal".to_string()),
        JobOutcome::Errored(JobError::Build { output, .. }) => {
            Some(format!("image build failed\n{output}"))
        }
        JobOutcome::Errored(e) => Some(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn jobs() -> Vec<convenient_travis::Job> {
        let config: serde_yaml::Value =
            serde_yaml::from_str("php: [7.0, 7.1]\nenv: ['DB=mysql', 'DB=pgsql']\n").unwrap();
        MatrixBuilder::new()
            .compute_jobs("vendor/app", Path::new("/src"), &config)
            .unwrap()
    }

    #[test]
    fn test_no_filter_keeps_everything() {
        assert_eq!(RunOptions::default().filter().apply(jobs()).len(), 4);
    }

    #[test]
    fn test_filters_combine() {
        let options = RunOptions {
            php: Some("7".to_string()),
            env: Some("pgsql".to_string()),
            no_cache: false,
        };
        let selected = options.filter().apply(jobs());
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].label(), "php:7.0 DB=pgsql");
    }

    #[test]
    fn test_failure_descriptions() {
        assert!(describe_failure(&JobOutcome::Passed).is_none());
        assert_eq!(
            describe_failure(&JobOutcome::Failed { exit_code: Some(2) }).unwrap(),
            "exit code 2"
        );
        let build = JobOutcome::Errored(JobError::Build {
            image: "vendor/app:v1".to_string(),
            output: "Step 3/7 : RUN false".to_string(),
        });
        assert!(describe_failure(&build).unwrap().ends_with("RUN false"));
    }
}
