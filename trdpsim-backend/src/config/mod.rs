//! Configuration management module for the simulator.
//!
//! This module provides centralized configuration management with support for:
//! - CLI argument parsing
//! - Environment variable configuration
//! - Configuration validation
//! - Builder pattern for configuration construction

pub mod app_config;
pub mod cli;

pub use app_config::{AppConfig, AppConfigBuilder, LogLevel, resolve_home};
pub use cli::{CliCommand, CliConfig, RunOptions};

use anyhow::Result;

/// Main configuration manager that combines all configuration sources
#[derive(Debug, Clone)]
pub struct ConfigManager {
    pub app: AppConfig,
    pub command: CliCommand,
}

impl ConfigManager {
    /// Creates a new configuration manager from CLI arguments and environment
    pub fn from_cli_and_env() -> Result<Self> {
        let cli_config = CliConfig::from_args()?;
        Self::from_cli(cli_config)
    }

    pub fn from_cli(cli_config: CliConfig) -> Result<Self> {
        cli_config.validate()?;
        let app_config = AppConfig::from_cli(&cli_config)?;
        Ok(Self {
            app: app_config,
            command: cli_config.command,
        })
    }

    /// Validates the entire configuration
    pub fn validate(&self) -> Result<()> {
        self.app.validate()
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> Result<()> {
        self.app.init_logging()
    }
}
