//! Rating buckets and the expected-points-loss thresholds per bucket.
//!
//! Thresholds are percentiles of EP loss observed in rated games. The
//! defaults below are explicit configuration; calibration replaces them per
//! bucket and [`ThresholdStore`] swaps the new table in without a restart.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ThresholdError {
    #[error("expected {expected} threshold values, got {got}")]
    WrongLength { expected: usize, got: usize },
    #[error("threshold P{percentile} is not a finite non-negative number: {value}")]
    Invalid { percentile: u8, value: f64 },
    #[error("thresholds decrease from P{lower} ({lower_value}) to P{upper} ({upper_value})")]
    NotMonotonic {
        lower: u8,
        lower_value: f64,
        upper: u8,
        upper_value: f64,
    },
    #[error("no threshold file configured")]
    NoPath,
    #[error("failed to access threshold file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid threshold file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse rating partition. Fixed at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingBucket {
    UpTo1200,
    From1201To1600,
    From1601To2000,
    From2001,
}

impl RatingBucket {
    pub const ALL: [RatingBucket; 4] = [
        RatingBucket::UpTo1200,
        RatingBucket::From1201To1600,
        RatingBucket::From1601To2000,
        RatingBucket::From2001,
    ];

    pub fn from_rating(rating: i32) -> Self {
        match rating {
            i32::MIN..=1200 => RatingBucket::UpTo1200,
            1201..=1600 => RatingBucket::From1201To1600,
            1601..=2000 => RatingBucket::From1601To2000,
            _ => RatingBucket::From2001,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RatingBucket::UpTo1200 => "<=1200",
            RatingBucket::From1201To1600 => "1201-1600",
            RatingBucket::From1601To2000 => "1601-2000",
            RatingBucket::From2001 => ">=2001",
        }
    }
}

impl fmt::Display for RatingBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// Percentiles stored in an [`EpThresholds`], in order.
pub const PERCENTILES: [u8; 7] = [1, 5, 10, 25, 50, 75, 90];

/// EP-loss percentiles P1, P5, P10, P25, P50, P75, P90 for one bucket.
///
/// Always finite, non-negative and non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ThresholdValues", into = "ThresholdValues")]
pub struct EpThresholds([f64; 7]);

#[derive(Serialize, Deserialize)]
struct ThresholdValues {
    p1: f64,
    p5: f64,
    p10: f64,
    p25: f64,
    p50: f64,
    p75: f64,
    p90: f64,
}

impl TryFrom<ThresholdValues> for EpThresholds {
    type Error = ThresholdError;

    fn try_from(v: ThresholdValues) -> Result<Self, Self::Error> {
        EpThresholds::new([v.p1, v.p5, v.p10, v.p25, v.p50, v.p75, v.p90])
    }
}

impl From<EpThresholds> for ThresholdValues {
    fn from(t: EpThresholds) -> Self {
        let [p1, p5, p10, p25, p50, p75, p90] = t.0;
        ThresholdValues {
            p1,
            p5,
            p10,
            p25,
            p50,
            p75,
            p90,
        }
    }
}

impl EpThresholds {
    pub fn new(values: [f64; 7]) -> Result<Self, ThresholdError> {
        for (value, percentile) in values.iter().zip(PERCENTILES) {
            if !value.is_finite() || *value < 0.0 {
                return Err(ThresholdError::Invalid {
                    percentile,
                    value: *value,
                });
            }
        }
        for i in 1..values.len() {
            if values[i] < values[i - 1] {
                return Err(ThresholdError::NotMonotonic {
                    lower: PERCENTILES[i - 1],
                    lower_value: values[i - 1],
                    upper: PERCENTILES[i],
                    upper_value: values[i],
                });
            }
        }
        Ok(Self(values))
    }

    pub fn from_slice(values: &[f64]) -> Result<Self, ThresholdError> {
        let values: [f64; 7] = values.try_into().map_err(|_| ThresholdError::WrongLength {
            expected: PERCENTILES.len(),
            got: values.len(),
        })?;
        Self::new(values)
    }

    pub fn values(&self) -> [f64; 7] {
        self.0
    }

    pub fn p1(&self) -> f64 {
        self.0[0]
    }
    pub fn p5(&self) -> f64 {
        self.0[1]
    }
    pub fn p10(&self) -> f64 {
        self.0[2]
    }
    pub fn p25(&self) -> f64 {
        self.0[3]
    }
    pub fn p50(&self) -> f64 {
        self.0[4]
    }
    pub fn p75(&self) -> f64 {
        self.0[5]
    }
    pub fn p90(&self) -> f64 {
        self.0[6]
    }

    /// Upper loss bounds of the loss-banded tiers, best first: P5 (Best),
    /// P10, P25, P50, P75, P90 (Miss). Anything above is a blunder.
    pub fn tier_boundaries(&self) -> [f64; 6] {
        [self.0[1], self.0[2], self.0[3], self.0[4], self.0[5], self.0[6]]
    }
}

/// Thresholds of one bucket and where they came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketThresholds {
    pub thresholds: EpThresholds,
    /// Moves the percentiles were computed from; 0 for defaults.
    pub sample_count: usize,
    /// `false` when these are the built-in defaults.
    pub calibrated: bool,
}

impl BucketThresholds {
    pub fn default_for(thresholds: EpThresholds) -> Self {
        Self {
            thresholds,
            sample_count: 0,
            calibrated: false,
        }
    }
}

/// One [`BucketThresholds`] per rating bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    up_to_1200: BucketThresholds,
    from_1201_to_1600: BucketThresholds,
    from_1601_to_2000: BucketThresholds,
    from_2001: BucketThresholds,
    #[serde(default)]
    calibrated_at: Option<DateTime<Utc>>,
}

const DEFAULT_THRESHOLDS: [[f64; 7]; 4] = [
    [0.0, 0.001, 0.005, 0.02, 0.05, 0.12, 0.25],
    [0.0, 0.001, 0.004, 0.015, 0.04, 0.10, 0.22],
    [0.0, 0.001, 0.003, 0.012, 0.03, 0.08, 0.18],
    [0.0, 0.001, 0.002, 0.01, 0.025, 0.06, 0.14],
];

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::defaults()
    }
}

impl ThresholdTable {
    /// Built-in thresholds. Stronger buckets tolerate less loss.
    pub fn defaults() -> Self {
        let bucket = |i: usize| BucketThresholds::default_for(EpThresholds(DEFAULT_THRESHOLDS[i]));
        Self {
            up_to_1200: bucket(0),
            from_1201_to_1600: bucket(1),
            from_1601_to_2000: bucket(2),
            from_2001: bucket(3),
            calibrated_at: None,
        }
    }

    pub fn get(&self, bucket: RatingBucket) -> &BucketThresholds {
        match bucket {
            RatingBucket::UpTo1200 => &self.up_to_1200,
            RatingBucket::From1201To1600 => &self.from_1201_to_1600,
            RatingBucket::From1601To2000 => &self.from_1601_to_2000,
            RatingBucket::From2001 => &self.from_2001,
        }
    }

    pub fn set(&mut self, bucket: RatingBucket, thresholds: BucketThresholds) {
        let slot = match bucket {
            RatingBucket::UpTo1200 => &mut self.up_to_1200,
            RatingBucket::From1201To1600 => &mut self.from_1201_to_1600,
            RatingBucket::From1601To2000 => &mut self.from_1601_to_2000,
            RatingBucket::From2001 => &mut self.from_2001,
        };
        *slot = thresholds;
    }

    pub fn for_rating(&self, rating: i32) -> &EpThresholds {
        &self.get(RatingBucket::from_rating(rating)).thresholds
    }

    pub fn calibrated_at(&self) -> Option<DateTime<Utc>> {
        self.calibrated_at
    }

    pub fn set_calibrated_at(&mut self, at: DateTime<Utc>) {
        self.calibrated_at = Some(at);
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ThresholdError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write the table as JSON. The file is replaced in one step so a
    /// concurrent reload never sees a partial write.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ThresholdError> {
        let path = path.as_ref();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// The live threshold table, replaceable while analyses are running.
///
/// Readers take a cheap snapshot with [`current`](Self::current); a reload
/// swaps the whole table at once.
#[derive(Debug)]
pub struct ThresholdStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<ThresholdTable>>,
}

impl ThresholdStore {
    /// A store that is never reloaded from disk.
    pub fn new(table: ThresholdTable) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(table)),
        }
    }

    /// Load `path`, falling back to `fallback` if it is missing or invalid.
    pub fn open(path: impl Into<PathBuf>, fallback: ThresholdTable) -> Self {
        let path = path.into();
        let table = match ThresholdTable::load(&path) {
            Ok(table) => {
                info!(path = %path.display(), "loaded calibrated thresholds");
                table
            }
            Err(ThresholdError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no threshold file, using defaults");
                fallback
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring threshold file, using defaults");
                fallback
            }
        };
        Self {
            path: Some(path),
            current: RwLock::new(Arc::new(table)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn current(&self) -> Arc<ThresholdTable> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn replace(&self, table: ThresholdTable) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(table);
    }

    /// Re-read the file. On failure the current table stays in place.
    pub fn reload(&self) -> Result<Arc<ThresholdTable>, ThresholdError> {
        let path = self.path.as_ref().ok_or(ThresholdError::NoPath)?;
        let table = Arc::new(ThresholdTable::load(path)?);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&table);
        info!(path = %path.display(), "reloaded thresholds");
        Ok(table)
    }
}
