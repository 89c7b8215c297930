//! Configuration module for the echo server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::Semaphore;

/// Command-line arguments for the echo server
#[derive(Parser, Debug)]
#[command(name = "tcp-echo")]
#[command(author = "tcp-echo authors")]
#[command(version = "0.1.0")]
#[command(about = "A TCP echo server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:7777)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Listen backlog passed to listen(2)
    #[arg(long)]
    pub backlog: Option<u32>,

    /// Per-connection read buffer size in bytes
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Maximum number of concurrent connections (0 = unbounded)
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// What to do when accepting a connection fails
    #[arg(long, value_enum)]
    pub accept_errors: Option<AcceptErrorPolicy>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Behavior of the accept loop when `accept(2)` fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AcceptErrorPolicy {
    /// Stop the server and exit with an error.
    #[default]
    Exit,
    /// Log the error and keep accepting.
    Continue,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Number of worker threads
    pub workers: Option<usize>,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Connection cap, 0 disables it
    #[serde(default)]
    pub max_connections: usize,
    #[serde(default)]
    pub accept_errors: AcceptErrorPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            workers: None,
            backlog: default_backlog(),
            max_connections: 0,
            accept_errors: AcceptErrorPolicy::default(),
        }
    }
}

/// Per-connection configuration
#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    /// Read buffer size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
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

fn default_listen() -> String {
    "0.0.0.0:7777".to_string()
}

fn default_backlog() -> u32 {
    10_000
}

fn default_buffer_size() -> usize {
    32 * 1024 // 32 KB
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub workers: Option<usize>,
    pub backlog: u32,
    pub buffer_size: usize,
    pub max_connections: Option<usize>,
    pub accept_errors: AcceptErrorPolicy,
    pub log_level: String,
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Config::resolve(CliArgs::empty(), TomlConfig::default())
            .expect("built-in defaults are valid")
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Config::resolve(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let listen = cli.listen.unwrap_or(toml_config.server.listen);
        let listen = listen
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidListen(listen))?;

        let workers = cli.workers.or(toml_config.server.workers);
        if workers == Some(0) {
            return Err(ConfigError::Invalid("workers must be greater than 0"));
        }

        let backlog = cli.backlog.unwrap_or(toml_config.server.backlog);
        if backlog == 0 {
            return Err(ConfigError::Invalid("backlog must be greater than 0"));
        }

        let buffer_size = cli
            .buffer_size
            .unwrap_or(toml_config.connection.buffer_size);
        if buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer_size must be greater than 0"));
        }

        let max_connections = match cli
            .max_connections
            .unwrap_or(toml_config.server.max_connections)
        {
            0 => None,
            n if n > Semaphore::MAX_PERMITS => {
                return Err(ConfigError::Invalid("max_connections is too large"));
            }
            n => Some(n),
        };

        Ok(Config {
            listen,
            workers,
            backlog,
            buffer_size,
            max_connections,
            accept_errors: cli
                .accept_errors
                .unwrap_or(toml_config.server.accept_errors),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }
}

#[cfg(test)]
impl CliArgs {
    fn empty() -> Self {
        CliArgs {
            config: None,
            listen: None,
            workers: None,
            backlog: None,
            buffer_size: None,
            max_connections: None,
            accept_errors: None,
            log_level: None,
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidListen(String),
    Invalid(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidListen(addr) => {
                write!(f, "Invalid listen address '{addr}'")
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
