//! mcp-testbed: an MCP test server exercising the protocol surface
//!
//! Speaks JSON-RPC 2.0 over stdio and exposes test resources, tools,
//! prompts, completions, and logging-level control for exercising MCP
//! client implementations.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use mcp_testbed::config;
use mcp_testbed::mcp::server::McpServer;

/// MCP test server exercising the protocol surface.
///
/// Exposes test resources, tools, prompts, completions, and logging-level
/// control over stdio for exercising MCP client implementations.
#[derive(Parser, Debug)]
#[command(name = "mcp-testbed")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
///
/// Logs go to stderr: stdout carries the protocol stream and must stay
/// clean.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point for the mcp-testbed server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if let Some(path) = config_path {
                eprintln!("\nWhile loading: {}", path.display());
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting mcp-testbed server"
    );

    let mut server = McpServer::new(cfg.scheduler);

    info!("MCP server ready, waiting for client connection...");

    // Run the server
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    let result = runtime.block_on(server.run());

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn quiet_wins_over_verbose() {
        assert_eq!(get_log_level(3, true, "debug"), Level::ERROR);
    }

    #[test]
    fn config_level_applies_without_flags() {
        assert_eq!(get_log_level(0, false, "info"), Level::INFO);
        assert_eq!(get_log_level(0, false, "bogus"), Level::WARN);
    }
}
