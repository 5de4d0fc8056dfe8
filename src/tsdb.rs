use std::fmt::{Debug, Display, Formatter};

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

/// Start of a bucket, in seconds since the Unix epoch.
pub type BucketEpoch = i64;

/// Width of a bucket, in seconds. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rollup(u32);
impl Rollup {
    pub fn try_new(seconds: u32) -> Result<Self> {
        if seconds == 0 {
            bail!("Rollup cannot be 0 seconds");
        }
        Ok(Self(seconds))
    }

    /// Parses a resolution like `10s`, `1h` or `1d`.
    pub fn parse(value: &str) -> Result<Self> {
        let duration = duration_str::parse(value.trim())
            .map_err(|e| anyhow!("Invalid resolution {value:?}: {e}"))?;
        if duration.subsec_nanos() != 0 {
            bail!("Resolution {value:?} is not a whole number of seconds");
        }
        let seconds = u32::try_from(duration.as_secs())
            .map_err(|_| anyhow!("Resolution {value:?} is too large"))?;
        Self::try_new(seconds)
    }

    pub fn as_secs(self) -> i64 {
        i64::from(self.0)
    }
}
impl Display for Rollup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.0)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct RollupConfig {
    pub seconds: u32,
    pub samples: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TsdbConfig {
    #[serde(default = "default_rollups")]
    pub rollups: Vec<RollupConfig>,
    #[serde(default = "default_max_rollup_points")]
    pub max_rollup_points: usize,
}
impl Default for TsdbConfig {
    fn default() -> Self {
        Self {
            rollups: default_rollups(),
            max_rollup_points: default_max_rollup_points(),
        }
    }
}

fn default_rollups() -> Vec<RollupConfig> {
    vec![
        // 1 hour at 10 seconds
        RollupConfig {
            seconds: 10,
            samples: 360,
        },
        // 7 days at 1 hour
        RollupConfig {
            seconds: 3600,
            samples: 24 * 7,
        },
        // 90 days at 1 day
        RollupConfig {
            seconds: 3600 * 24,
            samples: 90,
        },
    ]
}

fn default_max_rollup_points() -> usize {
    10_000
}

/// Floors `timestamp` to the start of its bucket.
pub fn normalize_to_epoch(timestamp: DateTime<Utc>, rollup: Rollup) -> BucketEpoch {
    let epoch = timestamp.timestamp();
    epoch - epoch.rem_euclid(rollup.as_secs())
}

/// Number of buckets `rollup_series` yields for the window, without building it.
pub fn series_len(start: DateTime<Utc>, end: DateTime<Utc>, rollup: Rollup) -> u64 {
    if end < start {
        return 0;
    }
    let span = (end - start).num_seconds();
    u64::try_from(span / rollup.as_secs()).map_or(0, |steps| steps + 1)
}

/// Chooses bucket widths and enumerates bucket boundaries for a time window.
pub trait TimeSeries: Send + Sync + Debug {
    /// Available rollups, finest first.
    fn rollups(&self) -> &[Rollup];

    fn optimal_rollup(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Rollup;

    fn normalize_to_epoch(&self, timestamp: DateTime<Utc>, rollup: Rollup) -> BucketEpoch {
        normalize_to_epoch(timestamp, rollup)
    }

    /// Returns the rollup used and the sorted bucket epochs between `start` and `end`.
    ///
    /// The walk steps back from `end`, so the bucket holding `start` is not always
    /// part of the series. An inverted window yields no bucket.
    fn rollup_series(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        rollup: Option<Rollup>,
    ) -> (Rollup, Vec<BucketEpoch>) {
        let rollup = rollup.unwrap_or_else(|| self.optimal_rollup(start, end));
        let step = TimeDelta::seconds(rollup.as_secs());

        let mut series = Vec::new();
        let mut timestamp = end;
        while timestamp >= start {
            series.push(self.normalize_to_epoch(timestamp, rollup));
            timestamp = match timestamp.checked_sub_signed(step) {
                Some(t) => t,
                None => break,
            };
        }
        series.sort_unstable();
        series.dedup();

        (rollup, series)
    }
}

/// Rollups are sorted, finest first, and never empty.
#[derive(Debug, Clone)]
pub struct RollupTimeSeries {
    rollups: Vec<Rollup>,
    samples: Vec<u32>,
    coarsest: Rollup,
}

impl RollupTimeSeries {
    pub fn try_new(config: &TsdbConfig) -> Result<Self> {
        if config.rollups.is_empty() {
            bail!("At least one rollup has to be configured");
        }

        let mut configured = config.rollups.clone();
        configured.sort_by_key(|r| r.seconds);

        let mut rollups: Vec<Rollup> = Vec::with_capacity(configured.len());
        let mut samples = Vec::with_capacity(configured.len());
        for r in configured {
            let rollup = Rollup::try_new(r.seconds)?;
            if rollups.last() == Some(&rollup) {
                bail!("Rollup {} is configured twice", rollup);
            }
            if r.samples == 0 {
                bail!("Rollup {} needs at least one sample", rollup);
            }
            rollups.push(rollup);
            samples.push(r.samples);
        }

        let coarsest = match rollups.last() {
            Some(rollup) => *rollup,
            None => bail!("At least one rollup has to be configured"),
        };

        Ok(Self {
            rollups,
            samples,
            coarsest,
        })
    }
}

impl TimeSeries for RollupTimeSeries {
    fn rollups(&self) -> &[Rollup] {
        &self.rollups
    }

    /// The finest rollup whose retention covers the window,
    /// or the coarsest one if none does.
    fn optimal_rollup(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Rollup {
        let num_seconds = end.timestamp() - start.timestamp();

        self.rollups
            .iter()
            .zip(&self.samples)
            .find(|(rollup, samples)| rollup.as_secs() * i64::from(**samples) >= num_seconds)
            .map(|(rollup, _)| *rollup)
            .unwrap_or(self.coarsest)
    }
}
