use clap::Parser;
use page_sync::cli::commands::{cmd_replay, cmd_survey};
use page_sync::cli::config::{Cli, Commands, load_config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Replay { scenario, trace } => {
            cmd_replay(&scenario, trace.as_deref(), &config).await?;
        }
        Commands::Survey { scenario } => {
            cmd_survey(&scenario)?;
        }
    }

    Ok(())
}

/// RUST_LOG wins; otherwise -v/-vv/-vvv raise the level from warn.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("page_sync={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
