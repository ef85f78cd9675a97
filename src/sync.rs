//! Pull-list synchronization: resolve the week, fetch it, and rebuild the
//! stored schedule for that week.
//!
//! Every path ends in a [`SyncReport`]; errors are logged and folded into
//! one of its three shapes rather than returned to the caller.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::config::{Config, REFRESH_FORMAT};
use crate::db::Repository;
use crate::error::AppError;
use crate::feed::{FeedFailure, FeedOutcome, ReleaseFeed};
use crate::normalize::normalize;
use crate::week::{self, InvalidWeek, WeekKey, CURRENT_WEEK_SENTINEL};

/// What the caller asked for. A pulldate takes priority over `week`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequest {
    pub pulldate: Option<String>,
    pub week: Option<String>,
    pub year: Option<i32>,
}

impl PullRequest {
    /// Request for whatever week it is when the sync runs.
    pub fn current() -> Self {
        Self {
            pulldate: Some(CURRENT_WEEK_SENTINEL.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncReport {
    Success {
        count: usize,
        weeknumber: u32,
        year: i32,
    },
    Failure,
    UpdateRequired,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    InvalidInput(#[from] InvalidWeek),

    #[error("error encountered retrieving pull-list: {0}")]
    Transport(String),

    #[error("pull-list backend is unhealthy: {0}")]
    RemoteFault(FeedFailure),

    #[error("pull-list service requires a newer client")]
    ProtocolMismatch,

    #[error("weekly pull for {0} has no data; this is probably a back-end error")]
    EmptyResult(WeekKey),

    #[error("pull-list request rejected: {0}")]
    UnclassifiedStatus(FeedFailure),

    #[error("unreadable pull-list response: {0}")]
    MalformedBody(String),

    #[error("could not store pull-list: {0}")]
    Storage(#[from] AppError),
}

impl SyncError {
    pub fn report(&self) -> SyncReport {
        match self {
            SyncError::ProtocolMismatch => SyncReport::UpdateRequired,
            _ => SyncReport::Failure,
        }
    }
}

impl From<FeedFailure> for SyncError {
    fn from(failure: FeedFailure) -> Self {
        match failure {
            FeedFailure::Transport(msg) => SyncError::Transport(msg),
            FeedFailure::MalformedBody(msg) => SyncError::MalformedBody(msg),
            FeedFailure::Offline | FeedFailure::SiteFault(_) => SyncError::RemoteFault(failure),
            FeedFailure::InvalidDate | FeedFailure::Unclassified(_) => {
                SyncError::UnclassifiedStatus(failure)
            }
        }
    }
}

/// One async lock per week so overlapping syncs of the same week run in turn.
/// Entries are dropped again once no sync holds or waits on them.
#[derive(Default)]
struct WeekLocks {
    locks: Mutex<HashMap<WeekKey, Arc<AsyncMutex<()>>>>,
}

impl WeekLocks {
    async fn acquire(&self, key: WeekKey) -> WeekGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(key).or_default())
        };
        let mut guard = WeekGuard {
            locks: self,
            key,
            guard: None,
        };
        guard.guard = Some(lock.lock_owned().await);
        guard
    }

    fn release(&self, key: WeekKey) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Clones are only taken under this mutex, so a count of one means nobody is queued.
        if locks.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&key);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

struct WeekGuard<'a> {
    locks: &'a WeekLocks,
    key: WeekKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for WeekGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.release(self.key);
    }
}

pub struct PullListSync<F> {
    feed: F,
    repository: Repository,
    config: AsyncMutex<Config>,
    config_path: PathBuf,
    week_locks: WeekLocks,
}

impl<F: ReleaseFeed> PullListSync<F> {
    pub fn new(feed: F, repository: Repository, config: Config, config_path: PathBuf) -> Self {
        Self {
            feed,
            repository,
            config: AsyncMutex::new(config),
            config_path,
            week_locks: WeekLocks::default(),
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Timestamp of the last successful sync, if any.
    pub async fn last_refresh(&self) -> Option<String> {
        self.config.lock().await.pull_refresh.clone()
    }

    pub async fn sync_pull_list(&self, request: &PullRequest) -> SyncReport {
        self.sync_pull_list_at(request, Local::now().naive_local()).await
    }

    /// Same as `sync_pull_list` with `now` standing in for the local clock.
    pub async fn sync_pull_list_at(&self, request: &PullRequest, now: NaiveDateTime) -> SyncReport {
        match self.try_sync(request, now).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("[PULL-LIST] {}", e);
                e.report()
            }
        }
    }

    async fn try_sync(
        &self,
        request: &PullRequest,
        now: NaiveDateTime,
    ) -> Result<SyncReport, SyncError> {
        if let Some(pulldate) = &request.pulldate {
            tracing::info!("pulldate is : {}", pulldate);
        }
        let key = week::resolve(
            request.pulldate.as_deref(),
            request.week.as_deref(),
            request.year,
            now.date(),
        )?;

        let _guard = self.week_locks.acquire(key).await;

        let records = match self.feed.fetch(key).await {
            FeedOutcome::Success(records) => records,
            FeedOutcome::Failure(failure) => return Err(failure.into()),
            FeedOutcome::UpdateRequired => return Err(SyncError::ProtocolMismatch),
        };
        if records.is_empty() {
            return Err(SyncError::EmptyResult(key));
        }

        let count = records.len();
        let normalized = records.iter().map(normalize).collect();

        tracing::info!("Re-creating pull-list for {} to ensure everything's fresh.", key);
        let replacement = self.repository.replace_week(key, normalized).await?;
        tracing::debug!(
            "Replaced {} stale rows with {} for {}",
            replacement.removed,
            replacement.written,
            key
        );
        tracing::info!("[PULL-LIST] Successfully populated pull-list for {}", key);

        self.record_refresh(now).await;

        Ok(SyncReport::Success {
            count,
            weeknumber: key.week,
            year: key.year,
        })
    }

    async fn record_refresh(&self, now: NaiveDateTime) {
        let mut config = self.config.lock().await;
        config.pull_refresh = Some(now.format(REFRESH_FORMAT).to_string());
        if let Err(e) = config.save_to(&self.config_path) {
            tracing::warn!("Unable to record pull-list refresh time: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::NaiveDate;

    use crate::models::{ReleaseRecord, ScheduleRow};
    use crate::normalize::dedup_name;

    struct MockFeed {
        outcome: FeedOutcome,
        calls: AtomicUsize,
    }

    impl MockFeed {
        fn new(outcome: FeedOutcome) -> Self {
            Self {
                outcome,
                calls: AtomicUsize::new(0),
            }
        }

        fn releases(records: Vec<ReleaseRecord>) -> Self {
            Self::new(FeedOutcome::Success(records))
        }
    }

    impl ReleaseFeed for MockFeed {
        async fn fetch(&self, _key: WeekKey) -> FeedOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn release(series: &str, issue: &str) -> ReleaseRecord {
        ReleaseRecord {
            series: series.to_string(),
            issue: issue.to_string(),
            publisher: Some("Image".to_string()),
            shipdate: Some("2023-06-14".to_string()),
            weeknumber: Some("24".to_string()),
            year: Some("2023".to_string()),
            ..Default::default()
        }
    }

    fn june_15() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 6, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    struct Harness {
        sync: PullListSync<MockFeed>,
        config_path: PathBuf,
        _dir: tempfile::TempDir,
    }

    async fn harness(feed: MockFeed) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let repository = Repository::in_memory().await.unwrap();
        let sync = PullListSync::new(feed, repository, Config::default(), config_path.clone());
        Harness {
            sync,
            config_path,
            _dir: dir,
        }
    }

    fn stored_keys(rows: &[ScheduleRow]) -> Vec<(String, String)> {
        let mut keys: Vec<_> = rows
            .iter()
            .map(|r| (r.dynamic_name.clone(), r.issue.clone()))
            .collect();
        keys.sort();
        keys
    }

    #[tokio::test]
    async fn test_successful_sync_reports_and_stores() {
        let h = harness(MockFeed::releases(vec![release("Saga", "#66"), release("Monstress", "50")])).await;

        let report = h.sync.sync_pull_list_at(&PullRequest::current(), june_15()).await;

        assert_eq!(
            report,
            SyncReport::Success {
                count: 2,
                weeknumber: 24,
                year: 2023
            }
        );
        let rows = h.sync.repository().rows_for_week(WeekKey::new(24, 2023)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(h.sync.last_refresh().await.as_deref(), Some("2023-06-15 10:30:00"));

        let saved = Config::load_from(&h.config_path).unwrap();
        assert_eq!(saved.pull_refresh.as_deref(), Some("2023-06-15 10:30:00"));
    }

    #[tokio::test]
    async fn test_stored_rows_match_latest_feed_exactly() {
        let first = vec![release("Saga", "66"), release("Old Title", "9"), release("Monstress", "50")];
        let h = harness(MockFeed::releases(first)).await;
        let key = WeekKey::new(24, 2023);
        h.sync.sync_pull_list_at(&PullRequest::current(), june_15()).await;

        let latest = vec![release("Saga", "#66"), release("Monstress", "50"), release("Deadly Class", "1")];
        let h2 = PullListSync::new(
            MockFeed::releases(latest.clone()),
            h.sync.repository,
            Config::default(),
            h.config_path.clone(),
        );
        let report = h2.sync_pull_list_at(&PullRequest::current(), june_15()).await;
        assert!(matches!(report, SyncReport::Success { count: 3, .. }));

        let rows = h2.repository().rows_for_week(key).await.unwrap();
        let mut expected: Vec<_> = latest
            .iter()
            .map(|r| (dedup_name(&r.series), r.issue.replace('#', "")))
            .collect();
        expected.sort();
        assert_eq!(stored_keys(&rows), expected);
    }

    #[tokio::test]
    async fn test_repeated_sync_is_idempotent() {
        let h = harness(MockFeed::releases(vec![release("Saga", "66"), release("Monstress", "50")])).await;
        let key = WeekKey::new(24, 2023);

        h.sync.sync_pull_list_at(&PullRequest::current(), june_15()).await;
        let first = h.sync.repository().rows_for_week(key).await.unwrap();
        h.sync.sync_pull_list_at(&PullRequest::current(), june_15()).await;
        let second = h.sync.repository().rows_for_week(key).await.unwrap();

        assert_eq!(stored_keys(&first), stored_keys(&second));
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_week_fails_without_fetching() {
        for week in ["abc", "60"] {
            let h = harness(MockFeed::releases(vec![release("Saga", "66")])).await;
            let request = PullRequest {
                week: Some(week.to_string()),
                year: Some(2024),
                ..Default::default()
            };

            let report = h.sync.sync_pull_list_at(&request, june_15()).await;

            assert_eq!(report, SyncReport::Failure);
            assert_eq!(h.sync.feed.calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_empty_feed_keeps_existing_rows() {
        let h = harness(MockFeed::releases(vec![])).await;
        let key = WeekKey::new(24, 2023);
        h.sync
            .repository()
            .replace_week(key, vec![normalize(&release("Saga", "66"))])
            .await
            .unwrap();

        let report = h.sync.sync_pull_list_at(&PullRequest::current(), june_15()).await;

        assert_eq!(report, SyncReport::Failure);
        assert_eq!(h.sync.repository().count_for_week(key).await.unwrap(), 1);
        assert!(h.sync.last_refresh().await.is_none());
        assert!(!h.config_path.exists());
    }

    #[tokio::test]
    async fn test_update_required_is_reported_distinctly() {
        let h = harness(MockFeed::new(FeedOutcome::UpdateRequired)).await;
        let report = h.sync.sync_pull_list_at(&PullRequest::current(), june_15()).await;
        assert_eq!(report, SyncReport::UpdateRequired);
    }

    #[tokio::test]
    async fn test_feed_failures_report_failure() {
        let failures = [
            FeedFailure::Transport("connection refused".to_string()),
            FeedFailure::InvalidDate,
            FeedFailure::Offline,
            FeedFailure::SiteFault(999),
            FeedFailure::Unclassified(404),
            FeedFailure::MalformedBody("expected a sequence".to_string()),
        ];
        for failure in failures {
            let h = harness(MockFeed::new(FeedOutcome::Failure(failure.clone()))).await;
            let report = h.sync.sync_pull_list_at(&PullRequest::current(), june_15()).await;
            assert_eq!(report, SyncReport::Failure, "{:?}", failure);
        }
    }

    #[tokio::test]
    async fn test_explicit_week_request() {
        let h = harness(MockFeed::releases(vec![release("Saga", "66")])).await;
        let request = PullRequest {
            week: Some("5".to_string()),
            year: Some(2022),
            ..Default::default()
        };

        let report = h.sync.sync_pull_list_at(&request, june_15()).await;

        assert_eq!(
            report,
            SyncReport::Success {
                count: 1,
                weeknumber: 5,
                year: 2022
            }
        );
        assert_eq!(h.sync.repository().count_for_week(WeekKey::new(5, 2022)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_syncs_of_one_week() {
        let h = harness(MockFeed::releases(vec![release("Saga", "66"), release("Monstress", "50")])).await;
        let request = PullRequest::current();

        let (a, b) = tokio::join!(
            h.sync.sync_pull_list_at(&request, june_15()),
            h.sync.sync_pull_list_at(&request, june_15())
        );

        assert_eq!(a, b);
        assert_eq!(h.sync.repository().count_for_week(WeekKey::new(24, 2023)).await.unwrap(), 2);
        assert_eq!(h.sync.week_locks.len(), 0);
    }

    #[tokio::test]
    async fn test_week_locks_are_released_after_sync() {
        let h = harness(MockFeed::releases(vec![release("Saga", "66")])).await;
        let other_week = PullRequest {
            week: Some("5".to_string()),
            year: Some(2022),
            ..Default::default()
        };

        h.sync.sync_pull_list_at(&PullRequest::current(), june_15()).await;
        h.sync.sync_pull_list_at(&other_week, june_15()).await;

        assert_eq!(h.sync.week_locks.len(), 0);
    }

    #[tokio::test]
    async fn test_week_lock_kept_while_held() {
        let locks = WeekLocks::default();
        let key = WeekKey::new(24, 2023);

        let guard = locks.acquire(key).await;
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_config_write_failure_keeps_success() {
        let dir = tempfile::tempdir().unwrap();
        let repository = Repository::in_memory().await.unwrap();
        // The config path is an existing directory, so saving the refresh time fails.
        let sync = PullListSync::new(
            MockFeed::releases(vec![release("Saga", "66"), release("Monstress", "50")]),
            repository,
            Config::default(),
            dir.path().to_path_buf(),
        );

        let report = sync.sync_pull_list_at(&PullRequest::current(), june_15()).await;

        assert_eq!(
            report,
            SyncReport::Success {
                count: 2,
                weeknumber: 24,
                year: 2023
            }
        );
        assert_eq!(sync.repository().count_for_week(WeekKey::new(24, 2023)).await.unwrap(), 2);
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_report_shapes() {
        let success = SyncReport::Success {
            count: 2,
            weeknumber: 24,
            year: 2023,
        };
        assert_eq!(
            serde_json::to_value(&success).unwrap(),
            serde_json::json!({"status": "success", "count": 2, "weeknumber": 24, "year": 2023})
        );
        assert_eq!(
            serde_json::to_value(SyncReport::Failure).unwrap(),
            serde_json::json!({"status": "failure"})
        );
        assert_eq!(
            serde_json::to_value(SyncReport::UpdateRequired).unwrap(),
            serde_json::json!({"status": "update_required"})
        );
    }

    #[test]
    fn test_error_taxonomy() {
        let remote: SyncError = FeedFailure::Offline.into();
        assert!(matches!(remote, SyncError::RemoteFault(_)));
        let rejected: SyncError = FeedFailure::InvalidDate.into();
        assert!(matches!(rejected, SyncError::UnclassifiedStatus(_)));
        assert_eq!(SyncError::ProtocolMismatch.report(), SyncReport::UpdateRequired);
        assert_eq!(SyncError::EmptyResult(WeekKey::new(1, 2024)).report(), SyncReport::Failure);
    }
}
