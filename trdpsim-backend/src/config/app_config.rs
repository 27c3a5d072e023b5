//! Application configuration for the simulator.
//!
//! Resolves the data home, repository directories, schema locations and
//! logging level from the CLI and environment.

use anyhow::{Result, anyhow};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use super::cli::{CliConfig, DEFAULT_ENDPOINT};

/// Environment variable overriding the data home
pub const HOME_ENV: &str = "TRDP_SIM_HOME";
const HOME_DIR_NAME: &str = ".trdp-simulator";
const DEVICE_SCHEMA_FILE: &str = "trdp-config.xsd";

/// Log level enumeration
#[derive(Debug, Clone, PartialEq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to tracing level filter string
    pub fn to_filter_string(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Application configuration structure
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub home: PathBuf,
    pub devices_dir: PathBuf,
    pub scenarios_dir: PathBuf,
    pub runs_dir: PathBuf,
    /// Rules file for scenario documents; built-in rules when `None`
    pub scenario_schema: Option<PathBuf>,
    pub device_schema: PathBuf,
    pub endpoint: String,
    pub log_level: LogLevel,
    pub json_output: bool,
}

impl AppConfig {
    /// Create application configuration from CLI config
    pub fn from_cli(cli_config: &CliConfig) -> Result<Self> {
        let log_level = if cli_config.verbose {
            LogLevel::Debug
        } else {
            match env::var("RUST_LOG") {
                Ok(level_str) => Self::parse_log_level(&level_str),
                Err(_) => LogLevel::Warn,
            }
        };

        let home = resolve_home(cli_config.home.as_deref(), env::var(HOME_ENV).ok());

        let mut builder = AppConfigBuilder::new()
            .home(home)
            .endpoint(cli_config.endpoint.clone())
            .log_level(log_level)
            .json_output(cli_config.json);
        if let Some(schema) = &cli_config.scenario_schema {
            builder = builder.scenario_schema(schema.clone());
        }
        if let Some(schema) = &cli_config.device_schema {
            builder = builder.device_schema(schema.clone());
        }
        builder.build()
    }

    /// Parse log level from string
    pub fn parse_log_level(level_str: &str) -> LogLevel {
        // RUST_LOG may carry per-target directives; the first one decides
        let main_level = level_str
            .split(',')
            .next()
            .unwrap_or(level_str)
            .split('=')
            .next()
            .unwrap_or(level_str)
            .to_lowercase();

        match main_level.as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Warn,
        }
    }

    /// Create the repository directories if missing
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.devices_dir, &self.scenarios_dir, &self.runs_dir] {
            std::fs::create_dir_all(dir)
                .map_err(|e| anyhow!("Failed to create {}: {}", dir.display(), e))?;
        }
        Ok(())
    }

    /// Initialize logging based on configuration.
    ///
    /// Output goes to stderr so JSON on stdout stays parseable.
    pub fn init_logging(&self) -> Result<()> {
        let directives = match env::var("RUST_LOG") {
            Ok(existing) if !existing.is_empty() && self.log_level != LogLevel::Debug => existing,
            _ => self.log_level.to_filter_string().to_string(),
        };
        let filter = EnvFilter::try_new(&directives)
            .map_err(|e| anyhow!("Invalid log filter '{}': {}", directives, e))?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_level(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .try_init()
            .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

        tracing::debug!("Logging initialized with level: {:?}", self.log_level);
        Ok(())
    }

    /// Validate application configuration
    pub fn validate(&self) -> Result<()> {
        if self.home.as_os_str().is_empty() {
            return Err(anyhow!("Data home cannot be empty"));
        }
        if self.endpoint.trim().is_empty() {
            return Err(anyhow!("Endpoint cannot be empty"));
        }
        if let Some(schema) = &self.scenario_schema
            && schema.as_os_str().is_empty()
        {
            return Err(anyhow!("Scenario schema path cannot be empty"));
        }
        Ok(())
    }
}

/// Pick the data home: explicit flag, then environment, then `~/.trdp-simulator`
pub fn resolve_home(explicit: Option<&Path>, env_home: Option<String>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(value) = env_home
        && !value.trim().is_empty()
    {
        return PathBuf::from(value);
    }
    dirs::home_dir()
        .map(|dir| dir.join(HOME_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(HOME_DIR_NAME))
}

/// Builder pattern for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    home: Option<PathBuf>,
    scenario_schema: Option<PathBuf>,
    device_schema: Option<PathBuf>,
    endpoint: Option<String>,
    log_level: Option<LogLevel>,
    json_output: Option<bool>,
}

impl AppConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the data home
    pub fn home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn scenario_schema(mut self, path: impl Into<PathBuf>) -> Self {
        self.scenario_schema = Some(path.into());
        self
    }

    pub fn device_schema(mut self, path: impl Into<PathBuf>) -> Self {
        self.device_schema = Some(path.into());
        self
    }

    /// Set endpoint address
    pub fn endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    pub fn json_output(mut self, json: bool) -> Self {
        self.json_output = Some(json);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig> {
        let home = self
            .home
            .unwrap_or_else(|| resolve_home(None, None));
        let device_schema = self
            .device_schema
            .unwrap_or_else(|| home.join("schemas").join(DEVICE_SCHEMA_FILE));

        let config = AppConfig {
            devices_dir: home.join("devices"),
            scenarios_dir: home.join("scenarios"),
            runs_dir: home.join("runs"),
            scenario_schema: self.scenario_schema,
            device_schema,
            endpoint: self.endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            log_level: self.log_level.unwrap_or(LogLevel::Warn),
            json_output: self.json_output.unwrap_or(false),
            home,
        };

        config.validate()?;
        Ok(config)
    }
}
