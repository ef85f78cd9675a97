use std::time::Duration;

mod cli;
mod config;
mod db;
mod error;
mod feed;
mod models;
mod normalize;
mod sync;
mod week;

use anyhow::Context;
use chrono::Local;
use clap::Parser;

use cli::{Cli, Command};
use config::Config;
use db::Repository;
use error::Result;
use feed::{BackendHealth, FeedClient, ReleaseFeed};
use sync::{PullListSync, PullRequest, SyncReport};
use week::WeekKey;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (info and above unless RUST_LOG says otherwise)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let command = Cli::parse().into_command();

    let config_path = Config::config_path();
    let config = Config::load_from(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let repository = Repository::new(&config.db_path)
        .await
        .with_context(|| format!("opening pull-list database {}", config.db_path))?;
    let feed = FeedClient::new(&config.feed_url, &config.user_agent)?;
    let health = feed.health();
    let interval_minutes = config.refresh_interval_minutes.max(1);
    let sync = PullListSync::new(feed, repository, config, config_path);

    match command {
        Command::Sync { date, week, year } => {
            let request = cli::pull_request(date, week, year);
            let report = sync.sync_pull_list(&request).await;
            println!("{}", serde_json::to_string(&report)?);
            tracing::debug!("Pull-list backend is {}", health.status());
        }
        Command::Show { week, year, json } => {
            let today = WeekKey::containing(Local::now().date_naive());
            let key = WeekKey::new(week.unwrap_or(today.week), year.unwrap_or(today.year));
            show_week(&sync, key, json).await?;
        }
        Command::Watch => {
            watch(&sync, &health, Duration::from_secs(u64::from(interval_minutes) * 60)).await;
        }
    }

    Ok(())
}

async fn show_week<F: ReleaseFeed>(sync: &PullListSync<F>, key: WeekKey, json: bool) -> Result<()> {
    let rows = sync.repository().rows_for_week(key).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    match sync.last_refresh().await {
        Some(refreshed) => println!("Last refreshed: {}", refreshed),
        None => println!("Last refreshed: never"),
    }
    if rows.is_empty() {
        println!("Nothing stored for {}", key);
        return Ok(());
    }

    println!("{} ({} issues)", key, rows.len());
    for row in rows {
        println!(
            "{:<10}  {:<20}  {} #{}  [{}]",
            row.shipdate.as_deref().unwrap_or("-"),
            row.publisher.as_deref().unwrap_or("-"),
            row.comic,
            row.issue,
            row.status.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

/// Re-syncs the current week on a fixed interval until Ctrl-C.
async fn watch<F: ReleaseFeed>(sync: &PullListSync<F>, health: &BackendHealth, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = sync.sync_pull_list(&PullRequest::current()).await;
                match report {
                    SyncReport::Success { count, weeknumber, year } => {
                        tracing::info!("Refreshed {} issues for week {} of {}", count, weeknumber, year);
                    }
                    SyncReport::UpdateRequired => {
                        tracing::error!("The pull-list service requires a newer version of pullsync");
                    }
                    SyncReport::Failure => {
                        tracing::warn!("Pull-list refresh failed (backend {})", health.status());
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping pull-list watch");
                return;
            }
        }
    }
}
