//! mongodb-mcp-server: MCP server exposing MongoDB and MongoDB Atlas to AI assistants
//!
//! Speaks MCP over stdio. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use mongodb_mcp_server::atlas::ApiClient;
use mongodb_mcp_server::atlas_local::DockerAtlasLocal;
use mongodb_mcp_server::config::{self, Config, Overrides};
use mongodb_mcp_server::connection::{ConnectionManager, ConnectionOptions};
use mongodb_mcp_server::mcp::server::McpServer;
use mongodb_mcp_server::mongo::driver::DriverConnector;
use mongodb_mcp_server::session::Session;
use mongodb_mcp_server::tools::all_tools;

/// MCP server for MongoDB and MongoDB Atlas.
///
/// Lets AI assistants query and administer MongoDB deployments, Atlas
/// projects and local Atlas deployments.
#[derive(Parser, Debug)]
#[command(name = "mongodb-mcp-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// MongoDB connection string used when a tool needs a connection
    #[arg(long, env = "MDB_MCP_CONNECTION_STRING", hide_env_values = true)]
    connection_string: Option<String>,

    /// Atlas service account client ID
    #[arg(long, env = "MDB_MCP_API_CLIENT_ID")]
    api_client_id: Option<String>,

    /// Atlas service account client secret
    #[arg(long, env = "MDB_MCP_API_CLIENT_SECRET", hide_env_values = true)]
    api_client_secret: Option<String>,

    /// Only register tools that do not modify data
    #[arg(long, env = "MDB_MCP_READ_ONLY")]
    read_only: bool,

    /// Tools, categories or operation kinds to disable (comma separated)
    #[arg(long, value_delimiter = ',')]
    disabled_tools: Vec<String>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            connection_string: self.connection_string.clone(),
            api_client_id: self.api_client_id.clone(),
            api_client_secret: self.api_client_secret.clone(),
            read_only: self.read_only,
            disabled_tools: self.disabled_tools.clone(),
        }
    }
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
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds the session: MongoDB connector, Atlas client and local deployments.
async fn build_session(cfg: Config) -> Arc<Session> {
    let connection = ConnectionManager::new(
        Arc::new(
            DriverConnector::new()
                .with_server_selection_timeout(Duration::from_millis(cfg.connect_timeout_ms)),
        ),
        ConnectionOptions {
            connect_timeout: Duration::from_millis(cfg.connect_timeout_ms),
            browser_auth: cfg.browser,
        },
    );

    let api_client = match (&cfg.api_client_id, &cfg.api_client_secret) {
        (Some(id), Some(secret)) => match ApiClient::new(&cfg.api_base_url, id, secret) {
            Ok(client) => {
                info!(base_url = %cfg.api_base_url, "Atlas tools enabled");
                Some(Arc::new(client))
            }
            Err(e) => {
                warn!(error = %e, "Failed to create the Atlas API client, Atlas tools disabled");
                None
            }
        },
        _ => None,
    };

    let atlas_local = DockerAtlasLocal::detect().await;

    Session::new(Arc::new(cfg), connection, api_client, atlas_local)
}

/// Entry point for the mongodb-mcp-server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg.with_overrides(args.overrides()),
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nExpected config at: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = cfg.validate() {
        eprintln!("Configuration error: {e}");
        return ExitCode::FAILURE;
    }

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        read_only = cfg.read_only,
        "Starting mongodb-mcp-server"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    let result = runtime.block_on(async {
        let session = build_session(cfg).await;
        let mut server = McpServer::new(session, all_tools());

        info!("MCP server ready, waiting for client connection...");
        server.run().await
    });

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
    fn verbosity_overrides_config_level() {
        assert_eq!(get_log_level(0, false, "debug"), Level::DEBUG);
        assert_eq!(get_log_level(0, false, "nonsense"), Level::WARN);
        assert_eq!(get_log_level(2, false, "error"), Level::DEBUG);
        assert_eq!(get_log_level(3, true, "trace"), Level::ERROR);
    }

    #[test]
    fn disabled_tools_are_comma_separated() {
        let args = Args::parse_from([
            "mongodb-mcp-server",
            "--disabled-tools",
            "atlas,delete",
            "--read-only",
        ]);
        let overrides = args.overrides();
        assert_eq!(overrides.disabled_tools, ["atlas", "delete"]);
        assert!(overrides.read_only);
    }
}
