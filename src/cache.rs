//! Schedule cache manager.
//!
//! Owns the on-disk snapshot cache and the published in-memory model. One
//! `update` cycle: make sure the cache root exists, expire stale snapshots,
//! download and extract a fresh bundle when none survive, then rebuild the
//! model and publish it with a single reference swap. Failures never escape
//! `update`; the previously published model keeps serving lookups.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use futures::future::try_join_all;
use tracing::{error, info};

use crate::archive;
use crate::fetch::{BasicClient, HttpClient, fetch_bytes};
use crate::model::TransitModel;
use crate::scheduler::TaskScheduler;
use crate::snapshot;
use crate::tables::ScheduleTables;

/// Default snapshot time-to-live.
pub const DEFAULT_STALENESS_HOURS: i64 = 24;

pub struct ScheduleManager<C = BasicClient> {
    url: String,
    cache_root: PathBuf,
    staleness: Duration,
    client: C,
    /// The snapshot directory the published model was built from. Set only
    /// on successful rebuild, read-only elsewhere.
    current_snapshot: RwLock<Option<PathBuf>>,
    model: RwLock<Option<Arc<TransitModel>>>,
}

impl ScheduleManager<BasicClient> {
    pub fn new(url: impl Into<String>, cache_root: impl Into<PathBuf>, staleness: Duration) -> Self {
        Self::with_client(BasicClient::new(), url, cache_root, staleness)
    }
}

impl<C: HttpClient> ScheduleManager<C> {
    pub fn with_client(
        client: C,
        url: impl Into<String>,
        cache_root: impl Into<PathBuf>,
        staleness: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            cache_root: cache_root.into(),
            staleness,
            client,
            current_snapshot: RwLock::new(None),
            model: RwLock::new(None),
        }
    }

    /// The currently published model, if at least one build has succeeded.
    pub fn model(&self) -> Option<Arc<TransitModel>> {
        match self.model.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// The snapshot directory backing the published model.
    pub fn current_snapshot(&self) -> Option<PathBuf> {
        match self.current_snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Runs one full cache cycle. Never propagates errors: every failure is
    /// logged here and the manager survives to the next tick.
    pub async fn update(&self) {
        if let Err(err) = self.try_update().await {
            error!(error = %err, "Schedule cache update failed");
        }
    }

    async fn try_update(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.cache_root)
            .await
            .with_context(|| {
                format!("failed to create cache root {}", self.cache_root.display())
            })?;

        if self.check_for_update().await? {
            let name = snapshot::file_safe_timestamp(Utc::now());
            let snapshot_dir = self.cache_root.join(&name);

            let bytes = fetch_bytes(&self.client, &self.url)
                .await
                .context("schedule bundle download failed")?;

            let dest = snapshot_dir.clone();
            tokio::task::spawn_blocking(move || archive::extract_zip(&bytes, &dest)).await??;
            info!(path = %snapshot_dir.display(), "Schedule file system cache updated");

            self.rebuild().await?;
        }

        // A process restart with a fresh snapshot already on disk lands
        // here: nothing to download, but no model is published yet.
        if self.model().is_none() {
            self.rebuild().await?;
        }

        Ok(())
    }

    /// Expires stale or unparsable snapshot directories and reports whether
    /// a download is required: true when the cache was empty or every
    /// existing snapshot was flagged.
    async fn check_for_update(&self) -> Result<bool> {
        let names = list_directory_names(&self.cache_root).await?;
        if names.is_empty() {
            return Ok(true);
        }

        let now = Utc::now();
        let flagged: Vec<&String> = names
            .iter()
            .filter(|name| snapshot::is_stale(name, now, self.staleness))
            .collect();

        let removals = flagged.iter().map(|name| {
            let path = self.cache_root.join(name.as_str());
            async move {
                info!(path = %path.display(), "Removing expired schedule snapshot");
                tokio::fs::remove_dir_all(&path)
                    .await
                    .with_context(|| format!("failed to remove snapshot {}", path.display()))
            }
        });
        try_join_all(removals).await?;

        Ok(flagged.len() >= names.len())
    }

    /// Loads every table of the live snapshot, builds a new model, and
    /// publishes it atomically. The live snapshot is the one with the newest
    /// parseable timestamp, should several transiently coexist.
    async fn rebuild(&self) -> Result<()> {
        let names = list_directory_names(&self.cache_root).await?;
        let live = names
            .into_iter()
            .filter_map(|name| snapshot::parse_file_safe_timestamp(&name).map(|ts| (ts, name)))
            .max_by_key(|(ts, _)| *ts)
            .map(|(_, name)| name)
            .context("no schedule snapshot directory in cache")?;

        let snapshot_dir = self.cache_root.join(&live);
        let tables = ScheduleTables::load(&snapshot_dir).await?;
        let model = TransitModel::from_tables(&tables, Utc::now())?;

        self.publish(Arc::new(model), snapshot_dir);
        info!(snapshot = %live, "Schedule snapshot cached into memory");
        Ok(())
    }

    fn publish(&self, model: Arc<TransitModel>, snapshot_dir: PathBuf) {
        match self.model.write() {
            Ok(mut guard) => *guard = Some(model),
            Err(poisoned) => *poisoned.into_inner() = Some(model),
        }
        match self.current_snapshot.write() {
            Ok(mut guard) => *guard = Some(snapshot_dir),
            Err(poisoned) => *poisoned.into_inner() = Some(snapshot_dir),
        }
    }
}

impl<C: HttpClient + 'static> ScheduleManager<C> {
    /// Registers `update` with a new periodic runner and starts it: one
    /// immediate execution, then one per `poll_interval`.
    pub async fn start(self: Arc<Self>, poll_interval: std::time::Duration) -> TaskScheduler {
        info!("Schedule manager started");

        let mut scheduler = TaskScheduler::new(poll_interval);
        scheduler.add_task(move || {
            let manager = Arc::clone(&self);
            Box::pin(async move { manager.update().await })
        });
        scheduler.start().await;
        scheduler
    }
}

async fn list_directory_names(root: &Path) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(root)
        .await
        .with_context(|| format!("failed to list cache root {}", root.display()))?;

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_at(root: &Path) -> ScheduleManager {
        ScheduleManager::new(
            "http://unused.invalid/bundle.zip",
            root,
            Duration::hours(DEFAULT_STALENESS_HOURS),
        )
    }

    fn make_snapshot_dir(root: &Path, age: Duration) -> PathBuf {
        let name = snapshot::file_safe_timestamp(Utc::now() - age);
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn empty_cache_requires_update() {
        let root = tempfile::tempdir().unwrap();
        let manager = manager_at(root.path());
        assert!(manager.check_for_update().await.unwrap());
    }

    #[tokio::test]
    async fn fresh_snapshot_requires_no_update_and_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let kept = make_snapshot_dir(root.path(), Duration::hours(1));

        let manager = manager_at(root.path());
        assert!(!manager.check_for_update().await.unwrap());
        assert!(!manager.check_for_update().await.unwrap());
        assert!(kept.exists());
    }

    #[tokio::test]
    async fn all_stale_snapshots_are_cleared_and_update_required() {
        let root = tempfile::tempdir().unwrap();
        let stale = make_snapshot_dir(root.path(), Duration::hours(25));
        let garbage = root.path().join("not-a-timestamp");
        std::fs::create_dir_all(&garbage).unwrap();

        let manager = manager_at(root.path());
        assert!(manager.check_for_update().await.unwrap());
        assert!(!stale.exists());
        assert!(!garbage.exists());
    }

    #[tokio::test]
    async fn mixed_fresh_and_stale_keeps_the_fresh_snapshot() {
        let root = tempfile::tempdir().unwrap();
        let fresh = make_snapshot_dir(root.path(), Duration::hours(1));
        let stale = make_snapshot_dir(root.path(), Duration::hours(48));

        let manager = manager_at(root.path());
        assert!(!manager.check_for_update().await.unwrap());
        assert!(fresh.exists());
        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn rebuild_without_snapshot_fails_and_update_survives() {
        let root = tempfile::tempdir().unwrap();
        let manager = manager_at(root.path());

        assert!(manager.rebuild().await.is_err());
        assert!(manager.model().is_none());
        assert!(manager.current_snapshot().is_none());
    }
}
