use std::{collections::HashMap, fmt::Debug, path::Path};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{info, warn};

use crate::types::{AppSlug, InstallationId, InstallationRecord, OrganizationId, SentryApp};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreConfig {
    /// JSON file with `apps` and `installations` loaded at startup.
    pub seed_path: Option<std::path::PathBuf>,
}

/// Read access to apps and their installations, deleted ones included.
#[async_trait]
pub trait InstallationStore: Send + Sync + Debug {
    async fn get_app(&self, slug: &AppSlug) -> Result<Option<SentryApp>>;

    /// Installations whose `date_added` is in `[start, end]`.
    async fn installations_added_between(
        &self,
        slug: &AppSlug,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<InstallationRecord>>;

    async fn count_installations(&self, slug: &AppSlug) -> Result<u64>;

    async fn count_uninstallations(&self, slug: &AppSlug) -> Result<u64>;
}

#[derive(Deserialize)]
struct SeedFile {
    #[serde(default)]
    apps: Vec<SentryApp>,
    #[serde(default)]
    installations: Vec<InstallationRecord>,
}

#[derive(Debug, Default)]
struct StoreInner {
    apps: HashMap<AppSlug, SentryApp>,
    installations: Vec<InstallationRecord>,
}

#[derive(Debug, Default)]
pub struct InMemoryInstallationStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryInstallationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_new(config: &StoreConfig) -> Result<Self> {
        let store = Self::new();
        if let Some(path) = &config.seed_path {
            store.load_seed(path)?;
        }
        Ok(store)
    }

    pub fn load_seed<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read seed file {:?}", path))?;
        let seed: SeedFile = serde_json::from_str(&content)
            .with_context(|| format!("Cannot parse seed file {:?}", path))?;

        let apps_count = seed.apps.len();
        let installations_count = seed.installations.len();

        for app in seed.apps {
            self.register_app(app);
        }
        for record in seed.installations {
            self.insert_record(record)
                .with_context(|| format!("Invalid installation in {:?}", path))?;
        }

        info!(
            apps = apps_count,
            installations = installations_count,
            "Seed loaded from {:?}",
            path
        );

        Ok(())
    }

    pub fn register_app(&self, app: SentryApp) {
        let mut inner = self.inner.write();
        if inner.apps.insert(app.slug, app).is_some() {
            warn!(app = %app.slug, "App registered twice, owner replaced");
        }
    }

    pub fn record_install(
        &self,
        slug: AppSlug,
        organization: OrganizationId,
        at: DateTime<Utc>,
    ) -> Result<InstallationId> {
        self.insert_record(InstallationRecord {
            app: slug,
            organization,
            date_added: at,
            date_deleted: None,
        })
    }

    pub fn record_uninstall(&self, id: InstallationId, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write();
        let index = usize::try_from(id.0).map_err(|_| anyhow!("Invalid installation id"))?;
        let record = inner
            .installations
            .get_mut(index)
            .ok_or_else(|| anyhow!("Installation {} not found", id.0))?;

        if record.date_deleted.is_some() {
            bail!("Installation {} is already uninstalled", id.0);
        }
        if at < record.date_added {
            bail!("Installation {} cannot be deleted before being added", id.0);
        }
        record.date_deleted = Some(at);

        Ok(())
    }

    fn insert_record(&self, record: InstallationRecord) -> Result<InstallationId> {
        let mut inner = self.inner.write();
        if !inner.apps.contains_key(&record.app) {
            bail!("Unknown app {}", record.app);
        }

        let id = InstallationId(inner.installations.len() as u64);
        inner.installations.push(record);
        Ok(id)
    }
}

#[async_trait]
impl InstallationStore for InMemoryInstallationStore {
    async fn get_app(&self, slug: &AppSlug) -> Result<Option<SentryApp>> {
        Ok(self.inner.read().apps.get(slug).copied())
    }

    async fn installations_added_between(
        &self,
        slug: &AppSlug,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<InstallationRecord>> {
        let inner = self.inner.read();
        Ok(inner
            .installations
            .iter()
            .filter(|r| &r.app == slug && r.date_added >= start && r.date_added <= end)
            .copied()
            .collect())
    }

    async fn count_installations(&self, slug: &AppSlug) -> Result<u64> {
        let inner = self.inner.read();
        Ok(inner.installations.iter().filter(|r| &r.app == slug).count() as u64)
    }

    async fn count_uninstallations(&self, slug: &AppSlug) -> Result<u64> {
        let inner = self.inner.read();
        Ok(inner
            .installations
            .iter()
            .filter(|r| &r.app == slug && r.date_deleted.is_some())
            .count() as u64)
    }
}
