use anyhow::{Context as _, Result};
use clap::Parser;
use colored::Colorize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use fintrack_sync::cli::{commands, Context};
use fintrack_sync::Cli;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {:#}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let ctx = Context::load(&cli).context("failed to load configuration")?;
    let output = commands::run(&ctx, cli.command).await?;

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

/// Log to stderr so JSON output on stdout stays parseable.
fn init_logging(verbose: u8) {
    let filter = EnvFilter::builder()
        .with_default_directive(log_level(verbose).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Default level for `-v` count: warn, then debug, then trace.
const fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_flag_levels() {
        assert_eq!(log_level(0), LevelFilter::WARN);
        assert_eq!(log_level(1), LevelFilter::DEBUG);
        assert_eq!(log_level(2), LevelFilter::TRACE);
        assert_eq!(log_level(5), LevelFilter::TRACE);
    }
}
