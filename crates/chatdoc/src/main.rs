//! chat-a-doc server
//!
//! Serves the MCP bridge and the read-only file server on one port.
//! Every flag can also be set through its environment variable.

use anyhow::{bail, Context, Result};
use chatdoc_logging::{init_logging, LogConfig};
use chatdoc_mcp::{serve, SelectionPolicy, ServerConfig, Settings};
use chatdoc_security::PathGuard;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "chatdoc", version, about = "Secure document delivery for AI chat clients")]
struct Cli {
    /// Directory all reads and writes are confined to
    #[arg(long, env = "ALLOWED_ROOT")]
    allowed_root: Option<PathBuf>,

    /// Port for the MCP endpoint and file server
    #[arg(long, env = "HTTP_PORT", default_value_t = 8080)]
    http_port: u16,

    /// Bind address
    #[arg(long, env = "HTTP_HOST", default_value = "0.0.0.0")]
    http_host: IpAddr,

    /// Return HTTP download links instead of file paths
    #[arg(
        long,
        env = "USE_HTTP_LINKS",
        value_parser = BoolishValueParser::new(),
        action = ArgAction::Set,
        default_value_t = false,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    use_http_links: bool,

    /// Public base URL of the file server, e.g. https://docs.example.com
    #[arg(long, env = "HTTP_BASE_URL")]
    http_base_url: Option<String>,

    /// Share root (UNC or smb://) used to build links when HTTP links are off
    #[arg(long, env = "LINK_ROOT")]
    link_root: Option<String>,

    /// How templates are chosen: single, explicit, or first
    #[arg(long, env = "TEMPLATE_SELECTION", default_value_t = SelectionPolicy::Single)]
    template_selection: SelectionPolicy,

    /// Largest accepted JSON-RPC request body, in bytes
    #[arg(long, env = "MAX_REQUEST_BYTES")]
    max_request_bytes: Option<usize>,

    /// Write a daily-rolling log file here (must be outside the allowed root)
    #[arg(long, env = "LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            allowed_root: self.allowed_root.clone(),
            use_http_links: self.use_http_links,
            http_base_url: self.http_base_url.clone(),
            link_root: self.link_root.clone(),
            template_selection: self.template_selection,
            max_request_bytes: self.max_request_bytes,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:?}", err);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let log_dir = match &cli.log_dir {
        Some(dir) => Some(log_dir_outside_root(dir, cli.allowed_root.as_deref())?),
        None => None,
    };

    let _logging = init_logging(LogConfig {
        app_name: "chatdoc",
        verbose: cli.verbose,
        log_dir,
    })?;

    let config = ServerConfig::new(cli.settings()).context("Invalid configuration")?;
    let addr = SocketAddr::new(cli.http_host, cli.http_port);
    info!(version = %config.server_version, "Starting {}", config.server_name);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    runtime.block_on(serve(config, addr))
}

/// Create `dir` and return its canonical path. It must not lie inside the
/// allowed root.
fn log_dir_outside_root(dir: &Path, allowed_root: Option<&Path>) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    let canonical = dir
        .canonicalize()
        .with_context(|| format!("Invalid log directory: {}", dir.display()))?;

    // A bad root is reported by the config step with a proper message
    let Some(guard) = allowed_root.and_then(|root| PathGuard::new(root).ok()) else {
        return Ok(canonical);
    };
    if canonical.starts_with(guard.root()) {
        bail!(
            "LOG_DIR ({}) must not be inside ALLOWED_ROOT ({})",
            canonical.display(),
            guard.root().display()
        );
    }
    Ok(canonical)
}
