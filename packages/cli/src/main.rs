mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{check, collab_demo, formula, view, CheckArgs, DemoArgs, FormulaArgs, ViewArgs};
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Folio CLI - pages, databases and formulas from the terminal
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ./folio.config.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a formula, optionally against a database row
    Formula(FormulaArgs),

    /// Print the rows of a database view
    View(ViewArgs),

    /// Validate page and database JSON files
    Check(CheckArgs),

    /// Run two local actors editing the same page
    CollabDemo(DemoArgs),
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?.display().to_string();
    let config = Config::load(&cwd, cli.config.as_deref())?;

    match cli.command {
        Command::Formula(args) => formula(args, &cwd),
        Command::View(args) => view(args, &cwd, &config.default_actor),
        Command::Check(args) => check(args, &cwd),
        Command::CollabDemo(args) => collab_demo(args, &cwd, &config),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::parse_from(["folio", "--verbose", "formula", "1 + 2"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Formula(ref args) if args.expression == "1 + 2"));

        let cli = Cli::parse_from(["folio", "collab-demo", "--peer", "cy"]);
        assert!(matches!(cli.command, Command::CollabDemo(ref args) if args.peer == "cy"));

        assert!(Cli::try_parse_from(["folio", "formula", "1", "--row", "r1"]).is_err());
    }
}
