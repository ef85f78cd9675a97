use clap::{Parser, Subcommand};

use crate::sync::PullRequest;
use crate::week::CURRENT_WEEK_SENTINEL;

#[derive(Debug, Parser)]
#[command(
    name = "pullsync",
    version,
    about = "Keeps a local weekly release schedule in sync with the pull-list feed"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum Command {
    /// Fetch a week's releases and replace the stored schedule (default: current week)
    Sync {
        /// Release date (YYYY-MM-DD), or 00000000 for the current week
        #[arg(long = "date")]
        date: Option<String>,

        /// Week number to fetch when no date is given (0-52)
        #[arg(long = "week")]
        week: Option<String>,

        /// Year of the week (default: this year)
        #[arg(long = "year")]
        year: Option<i32>,
    },

    /// List the releases stored for a week
    Show {
        /// Week number (default: this week)
        #[arg(long = "week")]
        week: Option<u32>,

        /// Year (default: this year)
        #[arg(long = "year")]
        year: Option<i32>,

        /// Print rows as JSON
        #[arg(long = "json", default_value_t = false)]
        json: bool,
    },

    /// Re-sync the current week every `refresh_interval_minutes`
    Watch,
}

impl Cli {
    /// The requested command, falling back to a sync of the current week.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Sync {
            date: None,
            week: None,
            year: None,
        })
    }
}

/// Builds a sync request; with neither a date nor a week the current week is used.
pub fn pull_request(date: Option<String>, week: Option<String>, year: Option<i32>) -> PullRequest {
    let pulldate = if date.is_none() && week.is_none() {
        Some(CURRENT_WEEK_SENTINEL.to_string())
    } else {
        date
    };
    PullRequest {
        pulldate,
        week,
        year,
    }
}
