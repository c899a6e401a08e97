//! Run summary

use crate::executor::{JobOutcome, JobReport};
use colored::Colorize;
use std::fmt;

/// Reports of every executed job
#[derive(Debug, Default)]
pub struct RunSummary {
    reports: Vec<JobReport>,
}

impl RunSummary {
    /// Empty summary
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a finished job
    pub fn record(&mut self, report: JobReport) {
        self.reports.push(report);
    }

    /// All reports in execution order
    pub fn reports(&self) -> &[JobReport] {
        &self.reports
    }

    /// Jobs that passed
    pub fn passed(&self) -> impl Iterator<Item = &JobReport> {
        self.reports.iter().filter(|report| report.passed())
    }

    /// Failed jobs that were not allowed to fail
    pub fn failed(&self) -> impl Iterator<Item = &JobReport> {
        self.reports.iter().filter(|report| report.is_blocking_failure())
    }

    /// Failed jobs whose failure is tolerated
    pub fn allowed_failures(&self) -> impl Iterator<Item = &JobReport> {
        self.reports
            .iter()
            .filter(|report| !report.passed() && report.job.is_allowed_failure())
    }

    /// No blocking failure
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }
}

fn reason(outcome: &JobOutcome) -> String {
    match outcome {
        JobOutcome::Passed => "passed".to_string(),
        JobOutcome::Failed { exit_code: Some(code) } => format!("exit code {code}"),
        JobOutcome::Failed { exit_code: None } => "killed".to_string(),
        JobOutcome::Errored(e) => e.to_string(),
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} jobs, {} passed",
            self.reports.len(),
            self.passed().count()
        )?;

        let failed: Vec<_> = self.failed().collect();
        if !failed.is_empty() {
            writeln!(f, "{}", "Failed jobs:".red().bold())?;
            for report in failed {
                writeln!(f, "  - {} ({})", report.job.label(), reason(&report.outcome))?;
            }
        }

        let allowed: Vec<_> = self.allowed_failures().collect();
        if !allowed.is_empty() {
            writeln!(f, "{}", "Allowed failures:".yellow().bold())?;
            for report in allowed {
                writeln!(f, "  - {} ({})", report.job.label(), reason(&report.outcome))?;
            }
        }

        if self.is_success() {
            write!(f, "{}", "Build succeeded".green().bold())
        } else {
            write!(f, "{}", "Build failed".red().bold())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convenient_travis::{Environment, Job, ScriptPhases};

    fn report(version: &str, outcome: JobOutcome, allowed: bool) -> JobReport {
        let yaml = if allowed {
            format!("php: {version}\nmatrix:\n  allow_failures:\n    - php: {version}\n")
        } else {
            format!("php: {version}\n")
        };
        let config: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        let job = convenient_travis::MatrixBuilder::new()
            .compute_jobs("vendor/app", std::path::Path::new("/src"), &config)
            .unwrap()
            .remove(0);
        JobReport { job, outcome }
    }

    #[test]
    fn test_classification() {
        colored::control::set_override(false);
        let mut summary = RunSummary::new();
        summary.record(report("7.0", JobOutcome::Passed, false));
        summary.record(report("7.1", JobOutcome::Failed { exit_code: Some(1) }, false));
        summary.record(report("nightly", JobOutcome::Failed { exit_code: Some(255) }, true));
        summary.record(report("hhvm", JobOutcome::Passed, true));

        assert_eq!(summary.passed().count(), 2);
        assert_eq!(summary.failed().map(|r| r.job.version()).collect::<Vec<_>>(), vec!["7.1"]);
        assert_eq!(
            summary.allowed_failures().map(|r| r.job.version()).collect::<Vec<_>>(),
            vec!["nightly"]
        );
        assert!(!summary.is_success());

        let text = summary.to_string();
        assert!(text.contains("Failed jobs:\n  - php:7.1 (exit code 1)"));
        assert!(text.contains("Allowed failures:\n  - php:nightly (exit code 255)"));
        assert!(text.ends_with("Build failed"));
    }

    #[test]
    fn test_only_allowed_failures_is_success() {
        let job = Job::new(
            "vendor/app",
            "/src",
            "7.1",
            Environment::default(),
            ScriptPhases::default(),
            Vec::new(),
            Vec::new(),
        );
        let mut summary = RunSummary::new();
        summary.record(JobReport {
            job,
            outcome: JobOutcome::Passed,
        });
        summary.record(report("nightly", JobOutcome::Failed { exit_code: None }, true));

        assert!(summary.is_success());
        assert_eq!(summary.failed().count(), 0);
    }
}
