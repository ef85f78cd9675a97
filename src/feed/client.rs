use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use url::Url;

use crate::error::Result;
use crate::models::ReleaseRecord;
use crate::week::WeekKey;

/// Last known state of the remote pull-list service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    Unknown,
    Up,
    Down,
}

impl std::fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendStatus::Unknown => write!(f, "unknown"),
            BackendStatus::Up => write!(f, "up"),
            BackendStatus::Down => write!(f, "down"),
        }
    }
}

/// Shared handle on the backend status. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct BackendHealth {
    state: Arc<AtomicU8>,
}

impl BackendHealth {
    pub fn status(&self) -> BackendStatus {
        match self.state.load(Ordering::Acquire) {
            1 => BackendStatus::Up,
            2 => BackendStatus::Down,
            _ => BackendStatus::Unknown,
        }
    }

    fn set(&self, status: BackendStatus) {
        let raw = match status {
            BackendStatus::Unknown => 0,
            BackendStatus::Up => 1,
            BackendStatus::Down => 2,
        };
        self.state.store(raw, Ordering::Release);
    }
}

/// How the feed service's status codes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    InvalidDate,
    Offline,
    SiteFault,
    UpdateRequired,
    Unclassified,
}

impl StatusClass {
    pub fn from_code(code: u16) -> Self {
        match code {
            200 => StatusClass::Success,
            619 => StatusClass::InvalidDate,
            522 => StatusClass::Offline,
            999 | 111 => StatusClass::SiteFault,
            666 => StatusClass::UpdateRequired,
            _ => StatusClass::Unclassified,
        }
    }

    /// Health transition implied by this class, `None` when it leaves health alone.
    pub fn health_effect(self) -> Option<BackendStatus> {
        match self {
            StatusClass::Success => Some(BackendStatus::Up),
            StatusClass::Offline | StatusClass::SiteFault => Some(BackendStatus::Down),
            StatusClass::InvalidDate | StatusClass::UpdateRequired | StatusClass::Unclassified => {
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedFailure {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("no date supplied, or an invalid date was provided")]
    InvalidDate,
    #[error("pull-list service is offline")]
    Offline,
    #[error("site-specific fault (status {0})")]
    SiteFault(u16),
    #[error("unexpected status {0}")]
    Unclassified(u16),
    #[error("malformed response body: {0}")]
    MalformedBody(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedOutcome {
    Success(Vec<ReleaseRecord>),
    Failure(FeedFailure),
    UpdateRequired,
}

/// Source of weekly release lists.
pub trait ReleaseFeed: Send + Sync {
    /// Requests the releases for `key`. Exactly one attempt is made.
    fn fetch(&self, key: WeekKey) -> impl Future<Output = FeedOutcome> + Send;
}

pub struct FeedClient {
    client: Client,
    feed_url: Url,
    health: BackendHealth,
}

impl FeedClient {
    pub fn new(feed_url: &str, user_agent: &str) -> Result<Self> {
        let feed_url = Url::parse(feed_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(abbreviate_user_agent(user_agent))
            .build()?;

        Ok(Self {
            client,
            feed_url,
            health: BackendHealth::default(),
        })
    }

    pub fn health(&self) -> BackendHealth {
        self.health.clone()
    }

    fn request_url(&self, key: WeekKey) -> Url {
        let mut url = self.feed_url.clone();
        url.query_pairs_mut()
            .append_pair("week", &format!("{:02}", key.week))
            .append_pair("year", &key.year.to_string());
        url
    }
}

impl ReleaseFeed for FeedClient {
    async fn fetch(&self, key: WeekKey) -> FeedOutcome {
        let response = match self.client.get(self.request_url(key)).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("[PULL-LIST] Error encountered retrieving pull-list: {}", e);
                self.health.set(BackendStatus::Down);
                return FeedOutcome::Failure(FeedFailure::Transport(e.to_string()));
            }
        };

        let code = response.status().as_u16();
        let class = StatusClass::from_code(code);

        if class != StatusClass::Success {
            tracing::warn!("[{}] The error returned is: {:?}", code, response.headers());
            if let Some(status) = class.health_effect() {
                self.health.set(status);
            }
            return match class {
                StatusClass::InvalidDate => FeedOutcome::Failure(FeedFailure::InvalidDate),
                StatusClass::Offline => FeedOutcome::Failure(FeedFailure::Offline),
                StatusClass::SiteFault => FeedOutcome::Failure(FeedFailure::SiteFault(code)),
                StatusClass::UpdateRequired => FeedOutcome::UpdateRequired,
                _ => FeedOutcome::Failure(FeedFailure::Unclassified(code)),
            };
        }

        match response.json::<Vec<ReleaseRecord>>().await {
            Ok(records) => {
                self.health.set(BackendStatus::Up);
                tracing::info!("[WEEKLY-PULL] There are {} issues for {}", records.len(), key);
                FeedOutcome::Success(records)
            }
            Err(e) if e.is_decode() => {
                tracing::warn!("[PULL-LIST] Could not decode pull-list for {}: {}", key, e);
                FeedOutcome::Failure(FeedFailure::MalformedBody(e.to_string()))
            }
            Err(e) => {
                tracing::warn!("[PULL-LIST] Error reading pull-list body: {}", e);
                self.health.set(BackendStatus::Down);
                FeedOutcome::Failure(FeedFailure::Transport(e.to_string()))
            }
        }
    }
}

/// Shortens an agent string like `App/abcdef0123(v1.2) +url` to `App/abcdefv`.
///
/// Keeps everything up to six characters past the first `/`, then appends the
/// first character after the first `(`. A missing `/` keeps the first six
/// characters; a missing `(` appends the first character.
pub fn abbreviate_user_agent(agent: &str) -> String {
    let chars: Vec<char> = agent.chars().collect();
    let head_len = match chars.iter().position(|&c| c == '/') {
        Some(slash) => slash + 7,
        None => 6,
    };
    let tail_index = chars.iter().position(|&c| c == '(').map_or(0, |paren| paren + 1);

    let mut abbreviated: String = chars.iter().take(head_len).collect();
    if let Some(c) = chars.get(tail_index) {
        abbreviated.push(*c);
    }
    abbreviated
}
