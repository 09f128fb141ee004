//! ackloop application binary - composition root.
//!
//! 1. Parse CLI flags and load configuration from TOML
//! 2. Initialize tracing
//! 3. Wire a simulated world, transport and notification registry
//! 4. Run a scripted action session and print its report

mod cli;
mod scenario;

use clap::Parser;

use ackloop_core::config::AckloopConfig;

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config_file = args.resolve_config_path();
    let config = AckloopConfig::load_or_default(&config_file);

    // Tracing.
    let filter = args.resolve_log_filter(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&filter)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting ackloop v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    if let Some(path) = &args.write_config {
        config.save(path)?;
        tracing::info!(path = %path.display(), "Configuration written");
        return Ok(());
    }

    let options = scenario::Options {
        latency_ms: args.latency_ms,
        drop_first: args.drop_first,
    };
    let report = scenario::run(config, options).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print_summary();
    }

    tracing::info!(session = %report.session, "Run complete");
    Ok(())
}
