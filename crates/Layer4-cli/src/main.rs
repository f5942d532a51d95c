//! Wercker CLI - Main entry point

use anyhow::Context;
use bollard::Docker;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wercker_core::{
    Build, Config, CONFIG_FILE, DEFAULT_BUILD_DIR, DEFAULT_PROJECT_DIR, DEFAULT_STEP_DIR,
};
use wercker_pipeline::{BuildReport, FailurePolicy, Orchestrator, OrchestratorConfig};

/// Wercker - run build pipelines inside a container
#[derive(Parser, Debug)]
#[command(name = "wercker")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a project's build pipeline
    Build {
        /// Project name under the project directory
        project: String,

        /// Directory that holds project checkouts
        #[arg(long, default_value = DEFAULT_PROJECT_DIR)]
        project_dir: PathBuf,

        /// Directory that receives per-build staging trees
        #[arg(long, default_value = DEFAULT_BUILD_DIR)]
        build_dir: PathBuf,

        /// Directory that holds fetched step trees
        #[arg(long, default_value = DEFAULT_STEP_DIR)]
        step_dir: PathBuf,

        /// Print the full build report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match args.command {
        Command::Build {
            project,
            project_dir,
            build_dir,
            step_dir,
            json,
        } => run_build(&project, &project_dir, &build_dir, &step_dir, json).await,
    }
}

async fn run_build(
    project: &str,
    project_dir: &Path,
    build_dir: &Path,
    step_dir: &Path,
    json: bool,
) -> anyhow::Result<()> {
    let project_path = absolutize(project_dir.join(project))?;
    if !project_path.is_dir() {
        anyhow::bail!("project {} not found at {}", project, project_path.display());
    }

    let config = Config::load(project_path.join(CONFIG_FILE))
        .with_context(|| format!("failed to load {} for {}", CONFIG_FILE, project))?;

    // Single ambient injection point: the build id override and the host
    // env snapshot are read here and threaded through
    let build = Build::new(&config, std::env::var("WERCKER_BUILD_ID").ok())
        .with_build_dir(absolutize(build_dir.to_path_buf())?)
        .with_host_env(std::env::vars().collect());
    info!("build {} for project {}", build.id(), project);

    let docker =
        Arc::new(Docker::connect_with_local_defaults().context("failed to connect to docker")?);
    let orchestrator = Orchestrator::with_config(OrchestratorConfig {
        step_dir: absolutize(step_dir.to_path_buf())?,
        failure_policy: FailurePolicy::Continue,
    });

    let report = orchestrator
        .run(docker, &build, &config.box_ref, &project_path)
        .await?;
    print_report(&report, json)?;
    Ok(())
}

fn print_report(report: &BuildReport, json: bool) -> anyhow::Result<()> {
    for command in &report.commands {
        let scope = command.step_id.as_deref().unwrap_or("build");
        println!("[{}] {} : exit {}", scope, command.action, command.exit_status);
        for line in &command.output {
            println!("  {}", line);
        }
    }

    let failed = report.failed_commands();
    if failed.is_empty() {
        println!("build {}: all commands exited 0", report.build_id);
    } else {
        println!(
            "build {}: {} command(s) exited non-zero",
            report.build_id,
            failed.len()
        );
    }

    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    }
    Ok(())
}

/// Lexically absolutize a path against the current directory
fn absolutize(path: PathBuf) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
