//! Entangle compiler configuration
//!
//! Backend settings are read from an `entangle.toml` file; every key is
//! optional and falls back to its default.
//!
//! ```toml
//! log_level = "info"
//!
//! [analysis]
//! hotspot_threshold = 5
//! builtin_patterns = false
//!
//! [optimize]
//! level = 2
//! max_correlation_distance = 8
//! merge_policy = "none"
//!
//! [emit]
//! entry_point = "$main"
//! debug_lines = true
//! ```
//!
//! # Usage
//!
//! ```rust
//! use entangle::util::config::CompilerConfig;
//!
//! let config: CompilerConfig = "[optimize]\nlevel = 3\n".parse().unwrap();
//! assert_eq!(config.optimize.level, 3);
//! assert_eq!(config.analysis.hotspot_threshold, 5);
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::util::logger::LogLevel;

/// Default config file name
pub const CONFIG_FILE_NAME: &str = "entangle.toml";

/// Entry-point naming convention
pub const DEFAULT_ENTRY_POINT: &str = "$main";

/// Top-level compiler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CompilerConfig {
    /// Log level applied by `build_bytecode` through `util::logger`
    #[serde(default)]
    pub log_level: LogLevel,
    /// Resource-correlation analysis settings
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Optimization pipeline settings
    #[serde(default)]
    pub optimize: OptimizeConfig,
    /// Bytecode emission settings
    #[serde(default)]
    pub emit: EmitConfig,
}

/// Analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// A resource used more than this many times is a hotspot
    #[serde(default = "default_hotspot_threshold")]
    pub hotspot_threshold: usize,
    /// Register the built-in pattern matchers
    #[serde(default)]
    pub builtin_patterns: bool,
}

fn default_hotspot_threshold() -> usize {
    5
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            hotspot_threshold: 5,
            builtin_patterns: false,
        }
    }
}

/// Merge policy selector for level-1 similar-resource merging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicyKind {
    /// Never merge
    #[default]
    None,
    /// Merge pairs created over identical endpoints
    SameEndpoints,
}

/// Optimization configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeConfig {
    /// Requested level; values outside 1..=3 are clamped by the optimizer
    #[serde(default = "default_level")]
    pub level: i64,
    /// Create-pair instructions farther than this from their first use are sunk
    #[serde(default = "default_max_correlation_distance")]
    pub max_correlation_distance: usize,
    /// Similar-resource merge policy
    #[serde(default)]
    pub merge_policy: MergePolicyKind,
}

fn default_level() -> i64 {
    1
}

fn default_max_correlation_distance() -> usize {
    8
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            level: 1,
            max_correlation_distance: 8,
            merge_policy: MergePolicyKind::None,
        }
    }
}

/// Emission configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitConfig {
    /// Name of the entry function
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
    /// Record the per-instruction source line table flag
    #[serde(default = "default_debug_lines")]
    pub debug_lines: bool,
}

fn default_entry_point() -> String {
    DEFAULT_ENTRY_POINT.to_string()
}

fn default_debug_lines() -> bool {
    true
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            debug_lines: true,
        }
    }
}

impl FromStr for CompilerConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(ConfigError::Parse)
    }
}

impl CompilerConfig {
    /// Serialize back to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Locate `entangle.toml` in `dir`
pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE_NAME)
}

/// Load configuration from a file.
/// Returns the default config if the file doesn't exist.
pub fn load_config(path: &Path) -> Result<CompilerConfig, ConfigError> {
    if !path.exists() {
        return Ok(CompilerConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    content.parse()
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(#[source] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[source] toml::ser::Error),
}
