mod client;

pub use client::{BackendHealth, FeedClient, FeedFailure, FeedOutcome, ReleaseFeed};
