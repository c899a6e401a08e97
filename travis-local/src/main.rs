//! travis-local - run a Travis CI build matrix in local Docker containers

mod commands;

use clap::Parser;
use commands::{Cli, Commands};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "travis_local=debug,convenient_docker=debug,convenient_travis=debug"
    } else {
        "travis_local=info,convenient_docker=info,convenient_travis=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::ListJobs { commands: print_commands } => {
            commands::list_jobs::execute(&cli.project_dir, print_commands).await?;
        }
        Commands::Run { php, env, no_cache } => {
            let options = commands::run::RunOptions { php, env, no_cache };
            commands::run::execute(&cli.project_dir, cli.work_dir, cli.docker, options).await?;
        }
        Commands::Clean => {
            commands::clean::execute(cli.docker).await?;
        }
    }

    Ok(())
}
