use clap::Parser;
use tracing_subscriber::EnvFilter;

use newsrag::config::Config;

mod cli;

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // logs go to stderr so stdout stays valid JSON
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    init_logging(args.verbose);

    let config = Config::load()?;

    match args.command {
        cli::Command::Build { csv, no_progress } => cli::handle_build(&config, csv, no_progress),
        cli::Command::Search { query, k } => cli::handle_search(&config, query, k),
        cli::Command::Web {
            query,
            k,
            max_chars,
        } => cli::handle_web(&config, query, k, max_chars),
        cli::Command::Ask {
            query,
            k,
            max_chars,
        } => cli::handle_ask(&config, query, k, max_chars),
        cli::Command::Serve { addr } => cli::handle_serve(&config, addr),
    }
}
