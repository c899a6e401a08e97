//! `list-jobs` command

use colored::Colorize;
use convenient_travis::{Job, MatrixBuilder, TravisProject};
use std::path::Path;

/// Print the jobs of the project's build matrix
pub async fn execute(project_dir: &Path, commands: bool) -> Result<(), Box<dyn std::error::Error>> {
    let project = TravisProject::load(project_dir).await?;
    let jobs = project.jobs(&MatrixBuilder::default())?;

    if commands {
        for line in run_commands(&jobs) {
            println!("{line}");
        }
        return Ok(());
    }

    println!("Found {} jobs:", jobs.len());
    for job in &jobs {
        if job.is_allowed_failure() {
            println!("- {} {}", job.label(), "(allowed to fail)".yellow());
        } else {
            println!("- {}", job.label());
        }
    }
    Ok(())
}

/// `travis-local run` invocations selecting each job
pub fn run_commands(jobs: &[Job]) -> Vec<String> {
    jobs.iter()
        .map(|job| {
            format!(
                "travis-local run --php {} --env '{}'",
                job.version(),
                job.env_line().replace('\'', r"'\''")
            )
        })
        .collect()
}
