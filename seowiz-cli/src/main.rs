#![allow(
    clippy::needless_borrows_for_generic_args,
    clippy::useless_format,
    clippy::field_reassign_with_default
)]

use clap::{Parser, Subcommand};
use colored::Colorize;
use seowiz_core::{CliErrorDisplay, LoggingConfig, Phase, WizardConfig, WizardError};
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

use commands::{
    cmd_config, cmd_restart, cmd_retry, cmd_run, cmd_skip, cmd_status, cmd_steps, RunTarget,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Parser)]
#[command(name = "seowiz")]
#[command(version = VERSION)]
#[command(about = "Seowiz - SEO setup wizard orchestrator")]
#[command(long_about = r#"
Seowiz drives the SEO setup of a site through five phases: sequential
discovery, Search Console sync, a parallel analysis batch, AI training and
the final steps. Each step is a remote function call; long-running steps
hand back a job that is polled until it finishes.

Use 'seowiz run --site <id>' to start a run, 'seowiz status --site <id>' to
inspect it, and 'seowiz retry --site <id>' to resume after a failure.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Start a fresh setup run for a site")]
    Run {
        #[command(flatten)]
        target: RunTarget,
    },

    #[command(about = "Resume a halted run from the failed step (or a named step)")]
    Retry {
        #[command(flatten)]
        target: RunTarget,

        #[arg(long, help = "Step id to resume from instead of the failed step")]
        from: Option<String>,
    },

    #[command(about = "Restart: from the beginning, or rerun the current step")]
    Restart {
        #[command(flatten)]
        target: RunTarget,

        #[arg(long, help = "Rerun only from the step the run was on")]
        current: bool,
    },

    #[command(about = "Skip the remaining setup and mark it complete")]
    Skip {
        #[arg(short, long, env = "SEOWIZ_SITE_ID")]
        site: String,
    },

    #[command(about = "Show a saved run, or list every saved run")]
    Status {
        #[arg(short, long, env = "SEOWIZ_SITE_ID")]
        site: Option<String>,

        #[arg(short, long, default_value = "text")]
        format: String,

        #[arg(short, long, default_value = "10", help = "Number of log lines to show")]
        logs: usize,
    },

    #[command(about = "List the step catalog")]
    Steps {
        #[arg(short, long, help = "Only show steps of this phase")]
        phase: Option<String>,

        #[arg(short, long, default_value = "text")]
        format: String,
    },

    #[command(about = "Show the effective configuration")]
    Config {
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    #[command(about = "Show version information")]
    Version {
        #[arg(short, long)]
        detailed: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = WizardConfig::load()
        .map(|c| c.logging)
        .unwrap_or_default();
    init_logging(cli.verbose, &logging);

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<WizardError>() {
                Some(wizard_err) => {
                    eprint!("{}: {}", "Error".red().bold(), CliErrorDisplay::new(wizard_err))
                }
                None => eprintln!("{}: {}", "Error".red().bold(), e),
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let registry = tracing_subscriber::registry().with(filter);

    if logging.json_format {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run { target } => cmd_run(target).await,
        Commands::Retry { target, from } => cmd_retry(target, from).await,
        Commands::Restart { target, current } => cmd_restart(target, current).await,
        Commands::Skip { site } => cmd_skip(&site).await,
        Commands::Status { site, format, logs } => cmd_status(site.as_deref(), &format, logs).await,
        Commands::Steps { phase, format } => cmd_steps(phase.as_deref(), &format),
        Commands::Config { format } => cmd_config(&format),
        Commands::Version { detailed } => cmd_version(detailed),
    }
}

fn cmd_version(detailed: bool) -> anyhow::Result<()> {
    if detailed {
        println!("{}", "Seowiz Version Information".cyan().bold());
        println!("{}", "═".repeat(40).dimmed());
        println!("  {:<15} {}", "Version:".bold(), VERSION);
        println!("  {:<15} {}", "Name:".bold(), NAME);
        println!("  {:<15} Apache-2.0", "License:".bold());
        println!();
        println!("  {}", "Phases:".bold());
        for (i, phase) in Phase::ALL.iter().enumerate() {
            println!("    {}. {}", i + 1, phase.label());
        }
        println!();
        println!("  {}", "Build Information:".bold());
        println!("    Rust Edition: 2021");
        #[cfg(debug_assertions)]
        println!("    Build:        Debug");
        #[cfg(not(debug_assertions))]
        println!("    Build:        Release");
    } else {
        println!("seowiz {}", VERSION);
    }

    Ok(())
}
