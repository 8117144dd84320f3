//! Server configuration module
//!
//! Handles loading and parsing of server configuration from files and environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Server name used in logs
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Address to bind listeners on
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// WebSocket port for game clients
    #[serde(default = "default_websocket_port")]
    pub websocket_port: u16,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Origin allowed by CORS on the HTTP API
    #[serde(default = "default_client_url")]
    pub client_url: String,

    /// Maximum number of concurrent sessions
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Per-session broadcast backlog before the session is considered lagging
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    /// World behaviour settings
    #[serde(default)]
    pub world: WorldConfig,

    /// Item catalog configuration
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Raise the default log level (ignored when `RUST_LOG` is set)
    #[serde(default)]
    pub debug: bool,
}

/// World behaviour configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Return a departing user's inventory to the world at their last position
    #[serde(default)]
    pub return_items_on_disconnect: bool,
}

/// Item catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Seed the world with the built-in item set
    #[serde(default = "default_true")]
    pub use_default_items: bool,

    /// PostgreSQL URL for the `items` table (catalog DB disabled when unset)
    #[serde(default)]
    pub database_url: Option<String>,

    /// Maximum connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Give up on the catalog database after this many seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

// Default value functions
fn default_server_name() -> String {
    "Neon World".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_websocket_port() -> u16 {
    3001
}

fn default_http_port() -> u16 {
    3002
}

fn default_client_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_max_connections() -> usize {
    1024
}

fn default_broadcast_capacity() -> usize {
    256
}

fn default_true() -> bool {
    true
}

fn default_pool_size() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    5
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            use_default_items: true,
            database_url: None,
            pool_size: default_pool_size(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/server.toml"),
            server_name: default_server_name(),
            bind_address: default_bind_address(),
            websocket_port: default_websocket_port(),
            http_port: default_http_port(),
            client_url: default_client_url(),
            max_connections: default_max_connections(),
            broadcast_capacity: default_broadcast_capacity(),
            world: WorldConfig::default(),
            catalog: CatalogConfig::default(),
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        // A missing .env is normal outside development
        let _ = dotenv::dotenv();

        let config_path = env::var("NEON_WORLD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/server.toml"));

        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            Self::from_toml(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Self::default()
        };

        config.config_path = config_path;

        config.apply_env_overrides();

        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("NEON_WORLD_SERVER_NAME") {
            self.server_name = val;
        }
        if let Ok(val) = env::var("NEON_WORLD_BIND_ADDRESS") {
            self.bind_address = val;
        }
        if let Ok(val) = env::var("NEON_WORLD_WEBSOCKET_PORT") {
            if let Ok(port) = val.parse() {
                self.websocket_port = port;
            }
        }
        if let Ok(val) = env::var("NEON_WORLD_HTTP_PORT") {
            if let Ok(port) = val.parse() {
                self.http_port = port;
            }
        }
        if let Ok(val) = env::var("NEON_WORLD_MAX_CONNECTIONS") {
            if let Ok(max) = val.parse() {
                self.max_connections = max;
            }
        }
        if let Ok(val) = env::var("NEON_WORLD_RETURN_ITEMS_ON_DISCONNECT") {
            self.world.return_items_on_disconnect = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(val) = env::var("NEON_WORLD_DEBUG") {
            self.debug = val.to_lowercase() == "true" || val == "1";
        }

        // CLIENT_URL and DATABASE_URL keep the names the web client deployment already uses
        if let Ok(val) = env::var("CLIENT_URL") {
            self.client_url = val;
        }
        if let Ok(val) = env::var("DATABASE_URL") {
            self.catalog.database_url = Some(val);
        }
        if let Ok(val) = env::var("NEON_WORLD_DATABASE_URL") {
            self.catalog.database_url = Some(val);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.websocket_port == 0 || self.http_port == 0 {
            anyhow::bail!("Ports must be non-zero");
        }

        if self.websocket_port == self.http_port {
            anyhow::bail!("WebSocket port and HTTP port must be different");
        }

        if self.max_connections == 0 || self.max_connections > 100_000 {
            anyhow::bail!("Max connections must be between 1 and 100000");
        }

        if self.broadcast_capacity == 0 {
            anyhow::bail!("Broadcast capacity must be at least 1");
        }

        if self.client_url.is_empty() {
            anyhow::bail!("Client URL must not be empty");
        }

        Ok(())
    }

    /// Default tracing filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "debug,neon_world_server=trace"
        } else {
            "info,neon_world_server=debug"
        }
    }

    /// Socket address string for the WebSocket listener
    pub fn websocket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.websocket_port)
    }

    /// Socket address string for the HTTP API listener
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.http_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server_name, "Neon World");
        assert_eq!(config.websocket_port, 3001);
        assert_eq!(config.client_url, "http://localhost:3000");
        assert!(config.catalog.use_default_items);
        assert!(config.catalog.database_url.is_none());
        assert!(!config.world.return_items_on_disconnect);
    }

    #[test]
    fn test_log_filter_follows_debug() {
        let mut config = ServerConfig::default();
        assert_eq!(config.log_filter(), "info,neon_world_server=debug");

        config.debug = true;
        assert_eq!(config.log_filter(), "debug,neon_world_server=trace");
    }

    #[test]
    fn test_addresses() {
        let config = ServerConfig::default();
        assert_eq!(config.websocket_addr(), "0.0.0.0:3001");
        assert_eq!(config.http_addr(), "0.0.0.0:3002");
    }

    #[test]
    fn test_validation() {
        let mut config = ServerConfig::default();

        assert!(config.validate().is_ok());

        config.http_port = config.websocket_port;
        assert!(config.validate().is_err());
        config.http_port = 3002;

        config.max_connections = 0;
        assert!(config.validate().is_err());
        config.max_connections = 10;

        config.broadcast_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            websocket_port = 4001

            [world]
            return_items_on_disconnect = true

            [catalog]
            use_default_items = false
            "#,
        )
        .unwrap();

        assert_eq!(config.websocket_port, 4001);
        assert_eq!(config.http_port, 3002);
        assert!(config.world.return_items_on_disconnect);
        assert!(!config.catalog.use_default_items);
        assert_eq!(config.catalog.pool_size, 5);
    }
}
