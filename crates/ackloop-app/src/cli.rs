//! CLI argument definitions for the ackloop binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// ackloop: confirmed actions against a remote world, run against the
/// built-in simulator.
#[derive(Parser, Debug)]
#[command(name = "ackloop", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Simulated round-trip latency in milliseconds. Omit to simulate an
    /// unknown latency and exercise the fallback.
    #[arg(long = "latency-ms")]
    pub latency_ms: Option<i64>,

    /// Simulated remote acknowledgement delay: the remote side ignores this
    /// many sends of each kind before it reacts.
    #[arg(long = "drop-first", default_value_t = 0)]
    pub drop_first: u32,

    /// Print the run report as JSON instead of a summary.
    #[arg(long = "json")]
    pub json: bool,

    /// Write the effective configuration to this path and exit.
    #[arg(long = "write-config")]
    pub write_config: Option<PathBuf>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > ACKLOOP_CONFIG env var > platform default (~/.ackloop/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("ACKLOOP_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log filter.
    ///
    /// Priority: --log-level flag > RUST_LOG > config file value.
    pub fn resolve_log_filter(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        if let Ok(filter) = std::env::var("RUST_LOG") {
            if !filter.trim().is_empty() {
                return filter;
            }
        }
        config_level.to_string()
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".ackloop").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".ackloop").join("config.toml");
    }
    PathBuf::from("config.toml")
}
