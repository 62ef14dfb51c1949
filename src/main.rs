//! Blueprint Mock Server - CLI Entry Point

use anyhow::{Context, Result};
use blueprint_mock_server::{MockServer, ServerConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "blueprint-mock-server",
    about = "Mock HTTP server for API Blueprint descriptions, with interactive response selection",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to run on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory to load API descriptions from
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Automatically respond to CORS preflight requests
    #[arg(long, value_name = "BOOL")]
    cors: Option<bool>,

    /// Always stick to the happy path
    #[arg(long)]
    happy: bool,

    /// How long a request waits for the control client (ms)
    #[arg(long, value_name = "MS")]
    answer_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Load the descriptions, report the routes, and exit
    #[arg(long)]
    validate: bool,
}

impl Args {
    /// Layer command-line flags over the file configuration.
    fn apply(&self, mut config: ServerConfig) -> ServerConfig {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(directory) = &self.directory {
            config.directory = directory.clone();
        }
        if let Some(cors) = self.cors {
            config.cors = cors;
        }
        if self.happy {
            config.happy_path = true;
        }
        if let Some(timeout) = self.answer_timeout_ms {
            config.answer_timeout_ms = timeout;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load configuration
    let file_config = match &args.config {
        Some(path) => {
            info!(path = ?path, "Loading configuration");
            ServerConfig::from_file(path)
                .with_context(|| format!("Invalid configuration file {}", path.display()))?
        }
        None => ServerConfig::default(),
    };
    let config = args.apply(file_config);
    config.validate()?;

    if args.print_config {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    let server = MockServer::load(config)
        .await
        .context("Failed to load API descriptions")?;

    if args.validate {
        println!(
            "Descriptions are valid ({} routes defined)",
            server.routes().len()
        );
        return Ok(());
    }

    let addr = server.config().listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    Arc::new(server).serve(listener, shutdown_signal()).await?;

    info!("Mock server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flags_override_file_before_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "answer_timeout_ms: 0\nport: 4000").unwrap();

        let args = Args::parse_from(["blueprint-mock-server", "--answer-timeout-ms", "500"]);
        let config = args.apply(ServerConfig::from_file(file.path()).unwrap());

        config.validate().unwrap();
        assert_eq!(config.answer_timeout_ms, 500);
        assert_eq!(config.port, 4000);
    }

    #[test]
    fn test_flags_keep_file_values_when_absent() {
        let args = Args::parse_from(["blueprint-mock-server", "--happy", "--cors", "false"]);
        let config = args.apply(ServerConfig::default());

        assert!(config.happy_path);
        assert!(!config.cors);
        assert_eq!(config.answer_timeout_ms, ServerConfig::default().answer_timeout_ms);
    }
}
