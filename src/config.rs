//! Configuration management for idlescope
//!
//! This module provides configuration persistence for analysis options
//! and report selection.

use crate::composite::{FreqExtremum, DEFAULT_COMPOSITE_FREQ};
use crate::error::{IdleError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// idlescope configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Replay options
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Report options
    #[serde(default)]
    pub report: ReportConfig,
}

/// Diagnostic level of the analyzer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Structural problems only
    Quiet,
    /// Structural problems and the stream summary
    #[default]
    Normal,
    /// Everything, including discarded intervals and ignored wake-ups
    Verbose,
}

impl Verbosity {
    /// Check if per-interval diagnostics are wanted
    pub fn is_verbose(self) -> bool {
        self == Verbosity::Verbose
    }
}

/// Replay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Diagnostic level
    #[serde(default)]
    pub verbosity: Verbosity,
    /// Running member frequency that represents a core or cluster
    #[serde(default = "default_composite_frequency")]
    pub composite_frequency: FreqExtremum,
    /// Keep every closed CPU idle interval for overlap queries
    #[serde(default)]
    pub retain_intervals: bool,
}

/// Report configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Report name: "default", "csv", "comparison"
    #[serde(default = "default_format")]
    pub format: String,
    /// Show C-state tables
    #[serde(default = "default_true")]
    pub idle: bool,
    /// Show P-state tables
    #[serde(default)]
    pub frequency: bool,
    /// Show wake-up tables
    #[serde(default)]
    pub wakeup: bool,
}

fn default_composite_frequency() -> FreqExtremum {
    DEFAULT_COMPOSITE_FREQ
}

fn default_format() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::default(),
            composite_frequency: default_composite_frequency(),
            retain_intervals: false,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            idle: true,
            frequency: false,
            wakeup: false,
        }
    }
}

impl ReportConfig {
    /// Check if any table is selected
    pub fn any_selected(&self) -> bool {
        self.idle || self.frequency || self.wakeup
    }
}

impl Config {
    /// Get the default configuration directory
    ///
    /// Returns `~/.config/idlescope`.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".config"))
            .unwrap_or_else(|_| PathBuf::from(".config"));

        Ok(config_dir.join("idlescope"))
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_file = Self::default_path()?.join("config.toml");

        if !config_file.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&config_file)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| IdleError::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::default_path()?;
        std::fs::create_dir_all(&config_dir)?;

        self.save_to(&config_dir.join("config.toml"))
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| IdleError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
