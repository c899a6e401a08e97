//! travis-local command-line interface
//!
//! - `list-jobs`: show the expanded build matrix
//! - `run`: build and run jobs in containers
//! - `clean`: remove images built by this tool

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod clean;
pub mod list_jobs;
pub mod run;

/// travis-local - run a Travis CI build matrix in local Docker containers
#[derive(Parser)]
#[command(name = "travis-local")]
#[command(about = "Run the Travis CI build matrix of a PHP project in local Docker containers")]
#[command(version)]
pub struct Cli {
    /// Project directory holding .travis.yml and composer.json
    #[arg(long, global = true, default_value = ".")]
    pub project_dir: PathBuf,

    /// Directory build contexts are staged in [default: $TMPDIR/travis-local]
    #[arg(long, global = true, env = "TRAVIS_LOCAL_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Docker executable [default: docker on PATH]
    #[arg(long, global = true, env = "TRAVIS_LOCAL_DOCKER")]
    pub docker: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the jobs of the build matrix
    ListJobs {
        /// Print a ready-to-run command per job instead
        #[arg(long)]
        commands: bool,
    },

    /// Build and run jobs
    Run {
        /// Only jobs of this PHP version
        #[arg(long)]
        php: Option<String>,

        /// Only jobs whose environment contains this text
        #[arg(long)]
        env: Option<String>,

        /// Build images without the layer cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Remove all images built by travis-local
    Clean,
}
