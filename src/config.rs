//! Configuration module for framechat.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values, which take
//! precedence over the built-in defaults.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::protocol::FrameCodec;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "framechat")]
#[command(author = "framechat authors")]
#[command(version = "0.1.0")]
#[command(about = "A multi-client TCP chat demo", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Which side of the conversation to run
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Accept clients and acknowledge their messages
    Server {
        /// Address to bind to (e.g., 0.0.0.0:5050)
        #[arg(short = 'l', long)]
        listen: Option<String>,
    },
    /// Connect to a server and send lines typed on stdin
    Client {
        /// Server address to connect to (e.g., 127.0.0.1:5050)
        #[arg(long)]
        connect: Option<String>,
    },
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Wire constants. Client and server must agree on every field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Width of the length header in bytes
    #[serde(default = "default_header_width")]
    pub header_width: usize,
    /// Payload that ends a session
    #[serde(default = "default_disconnect")]
    pub disconnect: String,
    /// Reply sent for every received frame
    #[serde(default = "default_ack")]
    pub ack: String,
    /// Size of the client's acknowledgment read
    #[serde(default = "default_recv_buffer")]
    pub recv_buffer: usize,
    /// Largest payload the server will accept
    #[serde(default = "default_max_payload")]
    pub max_payload: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            header_width: default_header_width(),
            disconnect: default_disconnect(),
            ack: default_ack(),
            recv_buffer: default_recv_buffer(),
            max_payload: default_max_payload(),
        }
    }
}

impl SessionConfig {
    /// Codec for this session's header width and payload limit.
    pub fn codec(&self) -> FrameCodec {
        FrameCodec::new(self.header_width, self.max_payload)
    }

    /// Reject settings that cannot produce a working session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.header_width == 0 {
            return Err(ConfigError::Invalid("header_width must be at least 1".into()));
        }
        if self.max_payload.to_string().len() > self.header_width {
            return Err(ConfigError::Invalid(format!(
                "max_payload {} does not fit in a {}-byte header",
                self.max_payload, self.header_width
            )));
        }
        if self.disconnect.is_empty() {
            return Err(ConfigError::Invalid("disconnect message must not be empty".into()));
        }
        if self.recv_buffer == 0 {
            return Err(ConfigError::Invalid("recv_buffer must be at least 1".into()));
        }
        Ok(())
    }
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    /// Server address to connect to
    #[serde(default = "default_connect")]
    pub connect: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect: default_connect(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_header_width() -> usize {
    64
}

fn default_disconnect() -> String {
    "!Disconnect".to_string()
}

fn default_ack() -> String {
    "Message received".to_string()
}

fn default_recv_buffer() -> usize {
    2048
}

fn default_max_payload() -> usize {
    16 * 1024 * 1024 // 16 MB
}

fn default_listen() -> String {
    "0.0.0.0:5050".to_string()
}

fn default_connect() -> String {
    "127.0.0.1:5050".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Process role with its resolved address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Server { listen: String },
    Client { connect: String },
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    pub session: SessionConfig,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let role = match cli.command {
            Command::Server { listen } => Role::Server {
                listen: listen.unwrap_or(toml_config.server.listen),
            },
            Command::Client { connect } => Role::Client {
                connect: connect.unwrap_or(toml_config.client.connect),
            },
        };

        let config = Config {
            role,
            session: toml_config.session,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        };
        config.session.validate()?;
        Ok(config)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
