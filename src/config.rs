//! Configuration for the mock server.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. Command-line flags are layered on top in `main`.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the mock server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
    /// Address to bind
    pub host: IpAddr,

    /// Port to listen on
    pub port: u16,

    /// Directory holding the API descriptions
    pub directory: PathBuf,

    /// Answer CORS preflight requests for every described resource
    pub cors: bool,

    /// Always serve the first response, never ask the control client
    pub happy_path: bool,

    /// How long a request waits for the control client before falling back (ms)
    pub answer_timeout_ms: u64,

    /// Path of the control client WebSocket
    pub control_path: String,

    /// Description parser executable
    pub drafter: String,

    /// Refuse to load responses whose name is not an HTTP status code
    pub strict_status: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
            directory: PathBuf::from("./api"),
            cors: true,
            happy_path: false,
            answer_timeout_ms: 30_000,
            control_path: "/ws".to_string(),
            drafter: "drafter".to_string(),
            strict_status: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    ///
    /// Only parses; call [`ServerConfig::validate`] once every override is applied.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.answer_timeout_ms == 0 {
            anyhow::bail!("answer_timeout_ms must be greater than zero");
        }
        if !self.control_path.starts_with('/') {
            anyhow::bail!(
                "control_path must start with '/', got {:?}",
                self.control_path
            );
        }
        if self.drafter.trim().is_empty() {
            anyhow::bail!("drafter cannot be empty");
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn answer_timeout(&self) -> Duration {
        Duration::from_millis(self.answer_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ServerConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert!(config.cors);
        assert!(!config.happy_path);
        assert_eq!(config.listen_addr().port(), 3000);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_partial_config() {
        let yaml = r#"
port: 8080
directory: ./blueprints
happy_path: true
answer_timeout_ms: 1500
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.directory, PathBuf::from("./blueprints"));
        assert!(config.happy_path);
        assert_eq!(config.answer_timeout(), Duration::from_millis(1500));
        assert_eq!(config.control_path, "/ws");
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result: Result<ServerConfig, _> = serde_yaml::from_str("stubs: []");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = ServerConfig {
            answer_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_relative_control_path() {
        let config = ServerConfig {
            control_path: "ws".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port: 4000\ncors: false").unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 4000);
        assert!(!config.cors);
    }

    #[test]
    fn test_from_file_leaves_validation_to_caller() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "answer_timeout_ms: 0").unwrap();

        let mut config = ServerConfig::from_file(file.path()).unwrap();
        assert!(config.validate().is_err());

        config.answer_timeout_ms = 500;
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults_round_trip_through_yaml() {
        let yaml = serde_yaml::to_string(&ServerConfig::default()).unwrap();
        let config: ServerConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config, ServerConfig::default());
    }
}
