//! Shopcheck entry point
//!
//! Exit status: 0 when every selected scenario passed (flaky counts as passed),
//! 1 when a scenario failed or the environment contract was violated, 2 when the
//! harness itself could not run.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shopcheck_common::{EnvSnapshot, ProjectKind, Validator};
use shopcheck_e2e::playwright::PlaywrightConfig;
use shopcheck_e2e::runner::{self, Gate, TestRunner};
use shopcheck_e2e::{
    scenarios, ArtifactStore, ExecutionPolicy, Executor, HarnessSettings, PageFactory,
    Partitioner, PlaywrightLauncher, RunMode, Selection,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "shopcheck")]
#[command(about = "Verification harness for the storefront UI and users API")]
#[command(version)]
struct Args {
    /// Run only this project (env, ui, api); repeatable
    #[arg(short, long = "project", value_name = "PROJECT")]
    projects: Vec<ProjectKind>,

    /// Run only scenarios whose name contains this text
    #[arg(short, long)]
    grep: Option<String>,

    /// Print the partition plan and exit
    #[arg(long)]
    list: bool,

    /// CI mode: one worker, two retries
    #[arg(long, env = "CI")]
    ci: bool,

    /// Override the retry budget of the run mode
    #[arg(long)]
    retries: Option<u32>,

    /// Harness settings file
    #[arg(short, long, default_value = "shopcheck.toml")]
    config: PathBuf,

    /// Output directory for results and artifacts
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    match args.log_format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }

    let result = tokio::runtime::Runtime::new()
        .context("failed to create tokio runtime")
        .and_then(|rt| rt.block_on(async_main(args)));

    match result {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(args: Args) -> anyhow::Result<bool> {
    info!("shopcheck v{}", shopcheck_common::VERSION);

    let mut settings = HarnessSettings::load(&args.config)?;
    if let Some(output) = args.output {
        settings.output_dir = output;
    }
    let mode = if args.ci { RunMode::Ci } else { RunMode::Local };

    let snapshot = Arc::new(EnvSnapshot::from_process());
    let validator = Validator::default();
    let registry = scenarios::registry(snapshot.clone(), validator.clone());
    let selection = Selection {
        projects: args.projects,
        grep: args.grep,
    };

    let env = match runner::gate(snapshot, validator, &registry, &selection, mode) {
        Gate::Open(env) => env,
        Gate::Closed(suite) => {
            if !args.list {
                runner::write_results(&settings.output_dir, &suite)?;
            }
            return Ok(false);
        }
    };

    let plans = Partitioner::partition(&env, &registry, &selection)?;
    if args.list {
        for plan in &plans {
            println!(
                "{} ({})",
                plan.project.name,
                plan.project.base_url.as_deref().unwrap_or("no target")
            );
            for scenario in &plan.scenarios {
                println!("  {}", scenario.name());
            }
        }
        return Ok(true);
    }

    let mut policy = ExecutionPolicy::new(mode, &env, &settings);
    if let Some(retries) = args.retries {
        policy = policy.with_retries(retries);
    }
    info!(
        "Mode {:?}: {} worker(s), {} retries",
        policy.mode, policy.workers, policy.retries
    );

    let launcher = PlaywrightLauncher::new(PlaywrightConfig::from_settings(&settings, env.headless()));
    if plans.iter().any(|p| p.project.kind == ProjectKind::Ui) {
        launcher.check_installed()?;
    }
    let pages: Arc<dyn PageFactory> = Arc::new(launcher);

    let artifacts = ArtifactStore::new(&settings.output_dir)?;
    let executor = Executor::new(policy, env, pages, artifacts);
    let suite = TestRunner::new(executor).run(plans).await;

    runner::write_results(&settings.output_dir, &suite)?;
    Ok(suite.success())
}
