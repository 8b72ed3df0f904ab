//! Engine launch settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How to start and configure one engine process.
///
/// Durations are written in milliseconds in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable.
    pub path: PathBuf,
    /// Extra command-line arguments.
    pub args: Vec<String>,
    /// Value for the `Threads` option.
    pub threads: u32,
    /// Value for the `Hash` option, in megabytes.
    pub hash_mb: u32,
    /// Additional `setoption` pairs applied after the handshake.
    pub options: Vec<(String, String)>,
    /// Upper bound for `uci`/`uciok` and every `isready`/`readyok` exchange.
    #[serde(with = "millis")]
    pub handshake_timeout: Duration,
    /// Time allowed past the search budget before the engine is told to stop.
    #[serde(with = "millis")]
    pub search_grace: Duration,
    /// Deadline for searches that have no time budget.
    #[serde(with = "millis")]
    pub max_search: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("stockfish"),
            args: Vec::new(),
            threads: 1,
            hash_mb: 64,
            options: Vec::new(),
            handshake_timeout: Duration::from_secs(10),
            search_grace: Duration::from_secs(2),
            max_search: Duration::from_secs(120),
        }
    }
}

impl EngineConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((name.into(), value.into()));
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
