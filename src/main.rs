use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use deot::cli::{execute_command, Commands};
use deot::config::{Config, LogFormat};
use deot::DualEngineAnalyzer;

/// Dual Engines of Thought: recursive breadth/depth analysis of a question.
#[derive(Parser, Debug)]
#[command(name = "deot", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "DEoT starting");

    let analyzer = match DualEngineAnalyzer::from_config(&config).await {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, "Failed to initialize analyzer");
            return Err(e.into());
        }
    };

    let result = execute_command(cli.command, &analyzer, &config.analysis).await;
    println!("{}", result.message);

    if result.exit_code != 0 {
        std::process::exit(result.exit_code);
    }
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
