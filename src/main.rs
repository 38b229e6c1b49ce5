use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use crew::config::{expand_tilde, CrewConfig};
use crew::orchestration::{formulate_strategy, StrategyRequest};
use crew::{Plan, Result};

/// Crew - multi-agent task orchestrator
#[derive(Parser, Debug)]
#[command(name = "crew")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    CREW_DEBUG=1    Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.crew/crew.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Config file to use instead of ~/.crew/crew.toml
    #[arg(short = 'c', long)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Validate a task plan and print its spawn order
    Check {
        /// Path to the plan TOML file
        plan: PathBuf,
    },

    /// Render a strategic decision record from a JSON request
    Strategy {
        /// Path to the request JSON file
        request: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    crew::log::init_with_debug(cli.debug);

    let config = match &cli.config {
        Some(path) => CrewConfig::load_from(&expand_tilde(path))?,
        None => CrewConfig::load()?,
    };

    match cli.command {
        Command::Check { plan } => run_check(&plan, &config),
        Command::Strategy { request } => run_strategy(&request),
        Command::Config => run_config(&config),
    }
}

fn run_check(path: &Path, config: &CrewConfig) -> Result<()> {
    info!(path = %path.display(), "check command");
    let plan = Plan::load(path)?;
    let order = plan.validate()?;

    println!(
        "Plan OK: {} task(s), up to {} concurrent worker(s)",
        order.len(),
        config.effective_max_concurrent()
    );
    for (index, task) in order.iter().enumerate() {
        if task.depends_on.is_empty() {
            println!("  {}. {} (priority {})", index + 1, task.key, task.priority);
        } else {
            println!(
                "  {}. {} (priority {}) after {}",
                index + 1,
                task.key,
                task.priority,
                task.depends_on.join(", ")
            );
        }
    }
    Ok(())
}

fn run_strategy(path: &Path) -> Result<()> {
    info!(path = %path.display(), "strategy command");
    let request: StrategyRequest = serde_json::from_str(&fs::read_to_string(path)?)?;
    println!("{}", formulate_strategy(&request)?);
    Ok(())
}

fn run_config(config: &CrewConfig) -> Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
