use std::net::IpAddr;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use super::Cli;
use dimse::DimseConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("AE title must be 1-16 characters")]
    InvalidAeTitle,

    #[error("'{0}' is not a valid IP address")]
    InvalidBindAddress(String),

    #[error("listen port must be greater than 0")]
    InvalidPort,

    #[error("image directory '{}' does not exist", .0.display())]
    MissingImageDir(PathBuf),
}

/// Top-level process configuration, loaded from a TOML file
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity of the served archive node
#[derive(Debug, Deserialize)]
pub struct NodeConfig {
    /// AE title this node answers as
    #[serde(default = "default_ae_title")]
    pub ae_title: String,

    /// Root directory of the served image files
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    #[serde(default = "default_max_associations")]
    pub max_associations: u32,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub log_to_file: bool,

    #[serde(default = "default_log_file_path")]
    pub log_file_path: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Load the configuration from the process arguments; without an
    /// argument, run on defaults.
    pub fn from_args() -> Config {
        match Cli::from_env().config_path {
            Some(path) => Self::from_file(&path),
            None => Config::default(),
        }
    }

    /// Load and parse a TOML configuration file. A missing or malformed
    /// file is fatal; nothing has started yet.
    pub fn from_file(path: &str) -> Config {
        let raw = std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("cannot read config file '{}': {}", path, e));
        toml::from_str(&raw)
            .unwrap_or_else(|e| panic!("invalid config file '{}': {}", path, e))
    }

    /// Validate the configuration before anything is bound or scanned
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.ae_title.is_empty() || self.node.ae_title.len() > 16 {
            return Err(ConfigError::InvalidAeTitle);
        }
        if self.network.bind_address.parse::<IpAddr>().is_err() {
            return Err(ConfigError::InvalidBindAddress(
                self.network.bind_address.clone(),
            ));
        }
        if self.network.bind_port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if !self.node.image_dir.is_dir() {
            return Err(ConfigError::MissingImageDir(self.node.image_dir.clone()));
        }
        Ok(())
    }

    /// Project the service-boundary configuration out of the process config
    pub fn dimse_config(&self) -> DimseConfig {
        DimseConfig {
            local_aet: self.node.ae_title.clone(),
            bind_addr: self
                .network
                .bind_address
                .parse()
                .expect("bind address was validated"),
            port: self.network.bind_port,
            max_associations: self.network.max_associations,
            ..DimseConfig::default()
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            ae_title: default_ae_title(),
            image_dir: default_image_dir(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
            max_associations: default_max_associations(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_to_file: false,
            log_file_path: default_log_file_path(),
            log_level: default_log_level(),
        }
    }
}

fn default_ae_title() -> String {
    "ARCHIVE".to_string()
}

fn default_image_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_bind_port() -> u16 {
    dimse::DEFAULT_DIMSE_PORT
}

fn default_max_associations() -> u32 {
    16
}

fn default_log_file_path() -> String {
    "phantom.log".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
