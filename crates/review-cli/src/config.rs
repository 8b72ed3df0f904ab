//! Configuration file loading for the review tool.
//!
//! Settings come from `review.toml` in the current directory unless a
//! path is given on the command line. Every field has a default, so a
//! missing file or a missing section is not an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use calibration::CalibrationConfig;
use chess_analysis::{AnalysisOptions, ClassifierConfig};
use engine_pool::EngineConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Size and acquire timeout of the analysis engine pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of engine processes.
    pub size: usize,
    /// How long a caller waits for a free engine, in milliseconds.
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 4,
            acquire_timeout_ms: 30_000,
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Calibration settings. Calibration runs on its own pool so it never
/// competes with interactive analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    pub pool_size: usize,
    #[serde(flatten)]
    pub run: CalibrationConfig,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            pool_size: 2,
            run: CalibrationConfig::default(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Threshold table in JSON.
    pub thresholds: PathBuf,
    /// Opening book in JSON. The built-in book is used when unset.
    pub book: Option<PathBuf>,
    pub engine: EngineConfig,
    pub pool: PoolConfig,
    pub analysis: AnalysisOptions,
    pub classifier: ClassifierConfig,
    pub calibration: CalibrationSettings,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            thresholds: PathBuf::from("thresholds.json"),
            book: None,
            engine: EngineConfig::default(),
            pool: PoolConfig::default(),
            analysis: AnalysisOptions::default(),
            classifier: ClassifierConfig::default(),
            calibration: CalibrationSettings::default(),
        }
    }
}

impl ReviewConfig {
    pub const DEFAULT_PATH: &'static str = "review.toml";

    /// Load the configuration.
    ///
    /// An explicit `path` must exist. Without one, `review.toml` is read
    /// if present and defaults are used otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let path = Path::new(Self::DEFAULT_PATH);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ReviewConfig::parse("").unwrap();
        assert_eq!(config, ReviewConfig::default());
        assert_eq!(config.pool.size, 4);
        assert_eq!(config.calibration.run.depth, 12);
        assert_eq!(config.calibration.run.min_samples, 100);
    }

    #[test]
    fn test_parse_full_config() {
        let config = ReviewConfig::parse(
            r#"
thresholds = "data/thresholds.json"
book = "data/book.json"

[engine]
path = "/usr/local/bin/stockfish"
threads = 2
hash_mb = 256
handshake_timeout = 5000

[pool]
size = 8
acquire_timeout_ms = 1500

[analysis]
depth = 20
lines = 3
default_rating = 1800

[classifier]
opening_window = 10
require_only_move = false

[calibration]
pool_size = 6
depth = 14
min_samples = 250
max_games = 5000
"#,
        )
        .unwrap();

        assert_eq!(config.thresholds, PathBuf::from("data/thresholds.json"));
        assert_eq!(config.book, Some(PathBuf::from("data/book.json")));
        assert_eq!(config.engine.path, PathBuf::from("/usr/local/bin/stockfish"));
        assert_eq!(config.engine.threads, 2);
        assert_eq!(config.engine.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.engine.hash_mb, 256);
        assert_eq!(config.pool.size, 8);
        assert_eq!(config.pool.acquire_timeout(), Duration::from_millis(1500));
        assert_eq!(config.analysis.depth, 20);
        assert_eq!(config.analysis.lines, 3);
        assert_eq!(config.analysis.default_rating, 1800);
        // Unset fields keep their defaults.
        assert_eq!(config.analysis.acquire_retries, AnalysisOptions::default().acquire_retries);
        assert_eq!(config.classifier.opening_window, 10);
        assert!(!config.classifier.require_only_move);
        assert_eq!(config.calibration.pool_size, 6);
        assert_eq!(config.calibration.run.depth, 14);
        assert_eq!(config.calibration.run.min_samples, 250);
        assert_eq!(config.calibration.run.max_games, Some(5000));
    }

    #[test]
    fn test_invalid_toml() {
        let result = ReviewConfig::parse("[pool]\nsize = \"many\"");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let result = ReviewConfig::load(Some(&dir.path().join("missing.toml")));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("review.toml");
        std::fs::write(&path, "[pool]\nsize = 1\n").unwrap();
        let config = ReviewConfig::load(Some(&path)).unwrap();
        assert_eq!(config.pool.size, 1);
    }
}
