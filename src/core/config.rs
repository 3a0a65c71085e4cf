//! Configuration management

use clap::Parser;
use config::{Config as ConfigBuilder, ConfigError as BuilderError, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default listen address, matching `:3333` on all interfaces
pub const DEFAULT_ADDRESS: &str = ":3333";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid init configuration: {0}")]
    InvalidInit(String),

    #[error("Invalid logging configuration: {0}")]
    InvalidLogging(String),

    #[error("Failed to load configuration: {0}")]
    LoadError(String),
}

impl From<BuilderError> for ConfigError {
    fn from(err: BuilderError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// Startup configuration document
///
/// `plugins` maps a plugin's composite key (`type/id`) to an override value
/// that is merged onto that plugin's default configuration. It and
/// `properties` are read from the file as plain JSON so their keys keep
/// their case; the layered builder only sees the flat settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub address: String,
    #[serde(skip)]
    pub plugins: HashMap<String, serde_json::Value>,
    /// Composite keys or plugin types excluded from resolution
    #[serde(default)]
    pub disabled_plugins: Vec<String>,
    /// Global properties visible to every plugin during init
    #[serde(skip)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub init: InitConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration with precedence: CLI args > Environment variables > Config file > Defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&CliArgs::parse())
    }

    /// Load configuration for already parsed command-line arguments
    ///
    /// A config file that does not exist is skipped, so a bare binary starts
    /// with the built-in defaults.
    pub fn load_from(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder()
            .set_default("address", DEFAULT_ADDRESS)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "text")?
            .set_default("logging.output", "stdout")?;

        builder = builder.add_source(
            File::from(cli_args.config.as_path())
                .format(FileFormat::Json)
                .required(false),
        );

        // Environment variables are prefixed with PLUGIN_HOST_ and use __ for nesting
        // Example: PLUGIN_HOST_LOGGING__LEVEL=debug
        builder = builder.add_source(
            Environment::with_prefix("PLUGIN_HOST")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("disabled_plugins"),
        );

        if let Some(address) = &cli_args.address {
            builder = builder.set_override("address", address.clone())?;
        }
        if let Some(log_level) = &cli_args.log_level {
            builder = builder.set_override("logging.level", log_level.clone())?;
        }
        if !cli_args.disable.is_empty() {
            builder = builder.set_override("disabled_plugins", cli_args.disable.clone())?;
        }

        let mut config: Config = builder.build()?.try_deserialize()?;

        let keyed = KeyedSections::read(&cli_args.config)?;
        config.plugins = keyed.plugins;
        config.properties = keyed.properties;

        config.validate()?;

        Ok(config)
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        self.init.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Resolve `address` to a socket address; a bare `:port` binds all interfaces
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.address.is_empty() {
            return Err(ConfigError::InvalidAddress("address cannot be empty".to_string()));
        }

        let address = if self.address.starts_with(':') {
            format!("0.0.0.0{}", self.address)
        } else {
            self.address.clone()
        };

        address
            .parse()
            .map_err(|e| ConfigError::InvalidAddress(format!("{}: {}", self.address, e)))
    }
}

/// Sections whose keys are names chosen by plugin authors
///
/// The layered builder folds key case, so these are parsed straight from
/// the file with `serde_json`.
#[derive(Debug, Default, Deserialize)]
struct KeyedSections {
    #[serde(default)]
    plugins: HashMap<String, serde_json::Value>,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

impl KeyedSections {
    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::LoadError(format!("{}: {}", path.display(), e)))
            }
        };

        serde_json::from_str(&text)
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))
    }
}

/// Command-line arguments for configuration override
#[derive(Debug, Parser)]
#[command(name = "plugin-host")]
#[command(about = "Plugin host with dependency-ordered initialization", long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    pub config: PathBuf,

    /// Listen address (`host:port` or `:port`)
    #[arg(short, long, value_name = "ADDR")]
    pub address: Option<String>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Disable a plugin by composite key or type (repeatable)
    #[arg(long, value_name = "KEY")]
    pub disable: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitConfig {
    /// Upper bound on a single plugin's init, unbounded when unset
    pub timeout_secs: Option<u64>,
}

impl InitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidInit("timeout_secs must be greater than 0".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
    pub log_file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(ConfigError::InvalidLogging(
                format!("level must be one of: {:?}", valid_levels)
            ));
        }

        let valid_formats = ["json", "text"];
        if !valid_formats.contains(&self.format.as_str()) {
            return Err(ConfigError::InvalidLogging(
                format!("format must be one of: {:?}", valid_formats)
            ));
        }

        let valid_outputs = ["stdout", "file"];
        if !valid_outputs.contains(&self.output.as_str()) {
            return Err(ConfigError::InvalidLogging(
                format!("output must be one of: {:?}", valid_outputs)
            ));
        }

        if self.output == "file" && self.log_file.is_none() {
            return Err(ConfigError::InvalidLogging(
                "log_file must be specified when output is 'file'".to_string()
            ));
        }

        Ok(())
    }
}
