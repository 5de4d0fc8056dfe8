use std::sync::Arc;

use anyhow::Context;
use thiserror::Error;
use tracing::{info, instrument};

use crate::{
    auth::AccessPolicy,
    metrics::{DroppedEventsLabels, StatsLabels, DROPPED_EVENTS_COUNTER, STATS_REQUEST_METRIC},
    stats::{bucket_installations, InstallStats, QueryWindow},
    storage::InstallationStore,
    tsdb::{series_len, TimeSeries},
    types::{ApiKey, AppSlug, SentryApp},
};

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Generic error: {0:?}")]
    Generic(#[from] anyhow::Error),
    #[error("App {0} not found")]
    AppNotFound(AppSlug),
    #[error("Invalid API key")]
    InvalidApiKey,
    #[error("Not allowed to read stats of app {0}")]
    Forbidden(AppSlug),
    #[error("The window needs {points} buckets, at most {max} are allowed")]
    TooManyBuckets { points: u64, max: usize },
}

pub struct StatsService {
    store: Arc<dyn InstallationStore>,
    time_series: Arc<dyn TimeSeries>,
    access_policy: AccessPolicy,
    max_rollup_points: usize,
}

impl StatsService {
    pub fn new(
        store: Arc<dyn InstallationStore>,
        time_series: Arc<dyn TimeSeries>,
        access_policy: AccessPolicy,
        max_rollup_points: usize,
    ) -> Self {
        Self {
            store,
            time_series,
            access_policy,
            max_rollup_points,
        }
    }

    pub fn time_series(&self) -> &dyn TimeSeries {
        self.time_series.as_ref()
    }

    pub fn max_rollup_points(&self) -> usize {
        self.max_rollup_points
    }

    /// Resolves the app and checks that `api_key` may read its stats.
    pub async fn authorize(
        &self,
        api_key: &ApiKey,
        slug: AppSlug,
    ) -> Result<SentryApp, StatsError> {
        let grant = self
            .access_policy
            .grant_for(api_key)
            .ok_or(StatsError::InvalidApiKey)?;

        let app = self
            .store
            .get_app(&slug)
            .await
            .context("Cannot read app")?
            .ok_or(StatsError::AppNotFound(slug))?;

        if !self.access_policy.can_read_stats(grant, &app) {
            return Err(StatsError::Forbidden(slug));
        }

        Ok(app)
    }

    #[instrument(skip(self, app), fields(app = %app.slug))]
    pub async fn install_stats(
        &self,
        app: &SentryApp,
        window: QueryWindow,
    ) -> Result<InstallStats, StatsError> {
        let rollup = window
            .resolution
            .unwrap_or_else(|| self.time_series.optimal_rollup(window.start, window.end));
        let points = series_len(window.start, window.end, rollup);
        if usize::try_from(points).map_or(true, |points| points > self.max_rollup_points) {
            return Err(StatsError::TooManyBuckets {
                points,
                max: self.max_rollup_points,
            });
        }

        let _m = STATS_REQUEST_METRIC.create(StatsLabels {
            app: app.slug.to_string(),
        });

        let installations = self
            .store
            .installations_added_between(&app.slug, window.start, window.end)
            .await
            .context("Cannot fetch installations")?;
        let total_installs = self
            .store
            .count_installations(&app.slug)
            .await
            .context("Cannot count installations")?;
        let total_uninstalls = self
            .store
            .count_uninstallations(&app.slug)
            .await
            .context("Cannot count uninstallations")?;

        let counts = bucket_installations(self.time_series.as_ref(), &window, &installations);

        if counts.dropped_installs > 0 {
            DROPPED_EVENTS_COUNTER
                .create(DroppedEventsLabels {
                    app: app.slug.to_string(),
                    kind: "install",
                })
                .increment_by(counts.dropped_installs);
        }
        if counts.dropped_uninstalls > 0 {
            DROPPED_EVENTS_COUNTER
                .create(DroppedEventsLabels {
                    app: app.slug.to_string(),
                    kind: "uninstall",
                })
                .increment_by(counts.dropped_uninstalls);
        }

        info!(
            rollup = %counts.rollup,
            buckets = counts.installs.len(),
            installations = installations.len(),
            "Install stats computed"
        );

        Ok(InstallStats::new(total_installs, total_uninstalls, counts))
    }
}
