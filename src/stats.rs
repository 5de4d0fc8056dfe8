use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::{
    tsdb::{BucketEpoch, Rollup, TimeSeries},
    types::InstallationRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub resolution: Option<Rollup>,
}

/// Counts per bucket. Buckets are fixed at construction and kept sorted,
/// so lookups are binary searches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    buckets: Vec<(BucketEpoch, u64)>,
}

impl Histogram {
    /// `series` has to be sorted and without duplicates.
    pub fn with_buckets(series: &[BucketEpoch]) -> Self {
        debug_assert!(series.windows(2).all(|w| w[0] < w[1]));
        Self {
            buckets: series.iter().map(|epoch| (*epoch, 0)).collect(),
        }
    }

    /// Returns false when `epoch` is not one of the buckets.
    pub fn increment(&mut self, epoch: BucketEpoch) -> bool {
        match self.buckets.binary_search_by_key(&epoch, |(e, _)| *e) {
            Ok(index) => {
                self.buckets[index].1 += 1;
                true
            }
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.buckets.iter().map(|(_, count)| count).sum()
    }

    pub fn into_points(self) -> Vec<(BucketEpoch, u64)> {
        self.buckets
    }
}

#[derive(Debug)]
pub struct BucketedCounts {
    pub rollup: Rollup,
    pub installs: Histogram,
    pub uninstalls: Histogram,
    pub dropped_installs: usize,
    pub dropped_uninstalls: usize,
}

/// Buckets creation and deletion times of `records` over the window.
///
/// Creation and deletion are normalized independently: a deletion outside the
/// window is still counted if its bucket belongs to the series. Epochs without
/// a bucket are dropped.
pub fn bucket_installations(
    time_series: &dyn TimeSeries,
    window: &QueryWindow,
    records: &[InstallationRecord],
) -> BucketedCounts {
    let (rollup, series) = time_series.rollup_series(window.start, window.end, window.resolution);

    let mut installs = Histogram::with_buckets(&series);
    let mut uninstalls = Histogram::with_buckets(&series);
    let mut dropped_installs = 0;
    let mut dropped_uninstalls = 0;

    for record in records {
        let epoch = time_series.normalize_to_epoch(record.date_added, rollup);
        if !installs.increment(epoch) {
            dropped_installs += 1;
        }

        if let Some(date_deleted) = record.date_deleted {
            let epoch = time_series.normalize_to_epoch(date_deleted, rollup);
            if !uninstalls.increment(epoch) {
                dropped_uninstalls += 1;
            }
        }
    }

    if dropped_installs > 0 || dropped_uninstalls > 0 {
        debug!(
            %rollup,
            dropped_installs,
            dropped_uninstalls,
            "Events outside of the bucket series"
        );
    }

    BucketedCounts {
        rollup,
        installs,
        uninstalls,
        dropped_installs,
        dropped_uninstalls,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallStats {
    pub total_installs: u64,
    pub total_uninstalls: u64,
    pub install_stats: Vec<(BucketEpoch, u64)>,
    pub uninstall_stats: Vec<(BucketEpoch, u64)>,
}

impl InstallStats {
    /// Totals are all-time counts and do not depend on the window.
    pub fn new(total_installs: u64, total_uninstalls: u64, counts: BucketedCounts) -> Self {
        Self {
            total_installs,
            total_uninstalls,
            install_stats: counts.installs.into_points(),
            uninstall_stats: counts.uninstalls.into_points(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        tsdb::{RollupConfig, RollupTimeSeries, TsdbConfig},
        types::{AppSlug, OrganizationId},
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ts(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    fn hundred_seconds() -> RollupTimeSeries {
        RollupTimeSeries::try_new(&TsdbConfig {
            rollups: vec![RollupConfig {
                seconds: 100,
                samples: 10,
            }],
            max_rollup_points: 100,
        })
        .unwrap()
    }

    fn window(start: i64, end: i64) -> QueryWindow {
        QueryWindow {
            start: ts(start),
            end: ts(end),
            resolution: None,
        }
    }

    fn record(added: i64, deleted: Option<i64>) -> InstallationRecord {
        InstallationRecord {
            app: AppSlug::try_new("app").unwrap(),
            organization: OrganizationId(1),
            date_added: ts(added),
            date_deleted: deleted.map(ts),
        }
    }

    #[test]
    fn test_histogram() {
        let mut h = Histogram::with_buckets(&[0, 100, 200]);
        assert!(h.increment(100));
        assert!(h.increment(100));
        assert!(!h.increment(50));
        assert!(!h.increment(300));
        assert_eq!(h.len(), 3);
        assert_eq!(h.total(), 2);
        assert_eq!(h.into_points(), vec![(0, 0), (100, 2), (200, 0)]);

        assert!(Histogram::with_buckets(&[]).is_empty());
    }

    #[test]
    fn test_bucket_installations_example() {
        let records = vec![
            record(100, None),
            record(100, None),
            record(200, Some(200)),
        ];

        let counts = bucket_installations(&hundred_seconds(), &window(0, 300), &records);
        let stats = InstallStats::new(3, 1, counts);

        assert_eq!(stats.install_stats, vec![(0, 0), (100, 2), (200, 1), (300, 0)]);
        assert_eq!(stats.uninstall_stats, vec![(0, 0), (100, 0), (200, 1), (300, 0)]);
    }

    #[test]
    fn test_bucket_coverage() {
        let records = vec![record(10, Some(20)), record(390, None)];

        for (start, end) in [(0, 0), (0, 99), (0, 300), (50, 950), (120, 121)] {
            let w = window(start, end);
            let (_, series) = hundred_seconds().rollup_series(w.start, w.end, None);
            let counts = bucket_installations(&hundred_seconds(), &w, &records);

            assert_eq!(counts.installs.len(), series.len());
            assert_eq!(counts.uninstalls.len(), series.len());

            let stats = InstallStats::new(0, 0, counts);
            let epochs: Vec<_> = stats.install_stats.iter().map(|(e, _)| *e).collect();
            assert_eq!(epochs, series);
            let epochs: Vec<_> = stats.uninstall_stats.iter().map(|(e, _)| *e).collect();
            assert_eq!(epochs, series);
        }
    }

    #[test]
    fn test_out_of_range_events_are_dropped() {
        // Bucket 0 is not part of the series: the walk from 250 stops at 150.
        let records = vec![
            record(95, Some(1_000)),
            record(120, Some(260)),
            record(210, Some(-5)),
        ];

        let counts = bucket_installations(&hundred_seconds(), &window(95, 250), &records);

        assert_eq!(counts.dropped_installs, 1);
        assert_eq!(counts.dropped_uninstalls, 2);
        assert_eq!(counts.installs.total(), 2);
        assert_eq!(counts.uninstalls.total(), 1);
        assert_eq!(counts.installs.into_points(), vec![(100, 1), (200, 1)]);
        assert_eq!(counts.uninstalls.into_points(), vec![(100, 0), (200, 1)]);
    }

    #[test]
    fn test_deletion_after_window_end_is_counted_when_bucket_matches() {
        // end = 250 falls in bucket 200; a deletion at 299 is after the window
        // but normalizes to 200.
        let records = vec![record(160, Some(299)), record(170, Some(300))];

        let counts = bucket_installations(&hundred_seconds(), &window(100, 250), &records);

        assert_eq!(counts.uninstalls.into_points(), vec![(100, 0), (200, 1)]);
        assert_eq!(counts.dropped_uninstalls, 1);
    }

    #[test]
    fn test_missing_deletion_is_not_an_uninstall() {
        let records = vec![record(100, None), record(200, None)];

        let counts = bucket_installations(&hundred_seconds(), &window(0, 300), &records);

        assert_eq!(counts.uninstalls.total(), 0);
        assert_eq!(counts.dropped_uninstalls, 0);
        assert_eq!(counts.installs.total(), 2);
    }

    #[test]
    fn test_single_point_window() {
        let records = vec![record(150, Some(150))];

        let counts = bucket_installations(&hundred_seconds(), &window(150, 150), &records);
        let stats = InstallStats::new(7, 4, counts);

        assert_eq!(stats.install_stats, vec![(100, 1)]);
        assert_eq!(stats.uninstall_stats, vec![(100, 1)]);
        assert_eq!(stats.total_installs, 7);
        assert_eq!(stats.total_uninstalls, 4);
    }

    #[test]
    fn test_explicit_resolution() {
        let series = RollupTimeSeries::try_new(&TsdbConfig::default()).unwrap();
        let w = QueryWindow {
            start: ts(0),
            end: ts(3 * 3600),
            resolution: Some(Rollup::try_new(3600).unwrap()),
        };
        let records = vec![record(10, None), record(3700, Some(7300))];

        let counts = bucket_installations(&series, &w, &records);

        assert_eq!(counts.rollup.as_secs(), 3600);
        assert_eq!(
            counts.installs.into_points(),
            vec![(0, 1), (3600, 1), (7200, 0), (10800, 0)]
        );
        assert_eq!(
            counts.uninstalls.into_points(),
            vec![(0, 0), (3600, 0), (7200, 1), (10800, 0)]
        );
    }

    #[test]
    fn test_serialization() {
        let counts = bucket_installations(&hundred_seconds(), &window(0, 100), &[record(0, None)]);
        let stats = InstallStats::new(1, 0, counts);

        assert_eq!(
            serde_json::to_value(&stats).unwrap(),
            json!({
                "totalInstalls": 1,
                "totalUninstalls": 0,
                "installStats": [[0, 1], [100, 0]],
                "uninstallStats": [[0, 0], [100, 0]],
            })
        );
    }
}
