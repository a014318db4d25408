//! mcp-testbed-client: a minimal MCP client for smoke-testing the server
//!
//! Spawns the server as a child process, performs the initialisation
//! handshake, lists the available tools, and prints them. Any failure,
//! including a connect timeout, tears the child down and exits non-zero.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

use mcp_testbed::config::{self, ClientConfig};

/// Minimal MCP client for smoke-testing the mcp-testbed server.
#[derive(Parser, Debug)]
#[command(name = "mcp-testbed-client")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Server command to spawn (overrides the config)
    #[arg(long, value_name = "COMMAND")]
    server: Option<String>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Client-side failures.
#[derive(Debug, thiserror::Error)]
enum ClientError {
    #[error("failed to spawn server '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server closed the connection")]
    Disconnected,

    #[error("timed out after {0:?} waiting for the server")]
    Timeout(Duration),

    #[error("server returned an error: {code} {message}")]
    Rpc { code: i64, message: String },

    #[error("unexpected server reply: {0}")]
    Protocol(String),
}

/// A connection to a spawned server, speaking one JSON-RPC message per line.
struct ServerConnection {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    next_id: i64,
    timeout: Duration,
}

impl ServerConnection {
    /// Spawns the server and takes its stdio pipes.
    fn spawn(cfg: &ClientConfig, command: &str) -> Result<Self, ClientError> {
        let mut child = Command::new(command)
            .args(&cfg.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClientError::Spawn {
                command: command.to_string(),
                source: e,
            })?;

        let stdin = child.stdin.take().ok_or(ClientError::Disconnected)?;
        let stdout = child.stdout.take().ok_or(ClientError::Disconnected)?;

        Ok(Self {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
            next_id: 1,
            timeout: Duration::from_secs(cfg.connect_timeout_secs),
        })
    }

    /// Sends a request and awaits the matching response, skipping any
    /// notifications or server-initiated requests that arrive in between.
    async fn request(&mut self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        self.send(&request).await?;

        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let next_line = tokio::time::timeout_at(deadline, self.lines.next_line())
                .await
                .map_err(|_| ClientError::Timeout(self.timeout))?;

            let Some(line) = next_line? else {
                return Err(ClientError::Disconnected);
            };

            let msg: Value = serde_json::from_str(&line)
                .map_err(|e| ClientError::Protocol(format!("invalid JSON from server: {e}")))?;

            if msg.get("id") != Some(&json!(id)) || msg.get("method").is_some() {
                debug!(%line, "Skipping interleaved message");
                continue;
            }

            if let Some(error) = msg.get("error") {
                return Err(ClientError::Rpc {
                    code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                    message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                });
            }

            return msg
                .get("result")
                .cloned()
                .ok_or_else(|| ClientError::Protocol("response without result".to_string()));
        }
    }

    /// Sends a notification (no response expected).
    async fn notify(&mut self, method: &str) -> Result<(), ClientError> {
        let notification = json!({ "jsonrpc": "2.0", "method": method });
        self.send(&notification).await
    }

    async fn send(&mut self, msg: &Value) -> Result<(), ClientError> {
        let mut line = serde_json::to_string(msg)
            .map_err(|e| ClientError::Protocol(format!("failed to serialise request: {e}")))?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Tears the child process down.
    async fn shutdown(mut self) {
        drop(self.stdin);
        if let Err(e) = self.child.kill().await {
            debug!(error = %e, "Failed to kill server process");
        }
    }
}

/// Runs the handshake-and-list flow against a freshly spawned server.
async fn run(cfg: &ClientConfig, command: &str) -> Result<(), ClientError> {
    let mut conn = ServerConnection::spawn(cfg, command)?;

    let outcome = handshake_and_list(cfg, &mut conn).await;
    conn.shutdown().await;
    outcome
}

async fn handshake_and_list(
    cfg: &ClientConfig,
    conn: &mut ServerConnection,
) -> Result<(), ClientError> {
    let init = conn
        .request(
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": { "sampling": {} },
                "clientInfo": { "name": cfg.name, "version": cfg.version },
            }),
        )
        .await?;

    info!(
        server = init["serverInfo"]["name"].as_str().unwrap_or("unknown"),
        version = init["serverInfo"]["version"].as_str().unwrap_or("unknown"),
        "Connected"
    );

    conn.notify("notifications/initialized").await?;

    let listed = conn.request("tools/list", json!({})).await?;
    let tools = listed
        .get("tools")
        .and_then(Value::as_array)
        .ok_or_else(|| ClientError::Protocol("tools/list result without tools".to_string()))?;

    println!("Available tools ({}):", tools.len());
    for tool in tools {
        let name = tool.get("name").and_then(Value::as_str).unwrap_or("?");
        let description = tool
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("");
        println!("  {name}: {description}");
    }

    Ok(())
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose, args.quiet);

    let cfg = match config::load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let command = args.server.unwrap_or_else(|| cfg.client.command.clone());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    match runtime.block_on(run(&cfg.client, &command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Client error: {e}");
            // Print the error chain for diagnosis
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
