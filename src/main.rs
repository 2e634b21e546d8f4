mod commands;

use clap::{Args, Parser, Subcommand};
use nyc_violations::config::AppConfig;
use nyc_violations::error::MonitorError;
use nyc_violations::monitor::Source;
use nyc_violations::telemetry;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "violation-monitor",
    about = "Check NYC Open Data for new violations on a property and e-mail a digest",
    version,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Path to the JSON configuration (defaults to $MONITOR_CONFIG or config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level regardless of configuration
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(flatten)]
    run: RunArgs,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, diff, and notify once (default command)
    Run(RunArgs),
    /// Probe every configured dataset and validate e-mail settings
    Check,
    /// List violations already recorded in the known-violations store
    Known(KnownArgs),
}

#[derive(Args, Debug, Default, Clone)]
pub(crate) struct RunArgs {
    /// Record new violations without sending the digest
    #[arg(long)]
    pub(crate) no_email: bool,
    /// Override the configured tax block
    #[arg(long)]
    pub(crate) block: Option<String>,
    /// Override the configured tax lot
    #[arg(long)]
    pub(crate) lot: Option<String>,
    /// Override the known-violations store location
    #[arg(long)]
    pub(crate) store: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct KnownArgs {
    /// Only list entries from one feed (311, hpd, oath, dob)
    #[arg(long, value_parser = parse_source)]
    pub(crate) source: Option<Source>,
}

fn main() {
    if let Err(err) = run_cli() {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<(), MonitorError> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if cli.verbose {
        config.telemetry.log_level = "debug".to_string();
    }

    let command = cli.command.unwrap_or(Command::Run(cli.run));
    if let Command::Run(args) = &command {
        commands::apply_overrides(&mut config, args);
    }

    telemetry::init(&config.telemetry)?;

    match command {
        Command::Run(args) => commands::run(&config, &args),
        Command::Check => commands::check(&config),
        Command::Known(args) => commands::known(&config, &args),
    }
}

fn parse_source(raw: &str) -> Result<Source, String> {
    raw.parse::<Source>()
}
