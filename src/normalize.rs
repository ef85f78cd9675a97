//! Series-name normalization used to deduplicate schedule rows.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{NormalizedRecord, ReleaseRecord};

/// Characters treated as word separators inside series names.
const SEPARATORS: &[char] = &[
    '/', '-', ':', ';', ',', '&', '?', '!', '+', '\'', '"', '(', ')', '.', '_', '~', '@', '#',
    '$', '%', '^', '*', '=', '\u{2013}', '\u{2014}',
];

static AND_WORD: OnceLock<Regex> = OnceLock::new();
static WHITESPACE: OnceLock<Regex> = OnceLock::new();
static PIPE_RUN: OnceLock<Regex> = OnceLock::new();
static PIPE_OR_SPACE: OnceLock<Regex> = OnceLock::new();

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern"))
}

/// Replaces separators and the word "and" in `series_name` with `|`.
///
/// Spacing is collapsed and repeated pipes fold into one, so names that only
/// differ in punctuation end up with the same shape.
pub fn dynamic_replace(series_name: &str) -> String {
    let replaced: String = series_name
        .chars()
        .map(|c| if SEPARATORS.contains(&c) { '|' } else { c })
        .collect();
    let replaced = regex(&AND_WORD, r"(?i)\band\b").replace_all(&replaced, "|");
    let replaced = regex(&WHITESPACE, r"\s+").replace_all(&replaced, " ");
    let replaced = regex(&PIPE_RUN, r"\|+").replace_all(replaced.trim(), "|");
    replaced.into_owned()
}

/// Key used to match a series across feed refreshes.
pub fn dedup_name(series_name: &str) -> String {
    let replaced = dynamic_replace(series_name);
    regex(&PIPE_OR_SPACE, r"[|\s]")
        .replace_all(&replaced.to_lowercase(), "")
        .trim()
        .to_string()
}

/// Issue number with `#` stripped.
pub fn clean_issue(issue: &str) -> String {
    issue.replace('#', "").trim().to_string()
}

pub fn normalize(record: &ReleaseRecord) -> NormalizedRecord {
    // The feed's alias is deliberately not used as the display name.
    let comic = record.series.clone();

    NormalizedRecord {
        dynamic_name: dedup_name(&comic),
        comic,
        issue: clean_issue(&record.issue),
        publisher: record.publisher.clone(),
        shipdate: record.shipdate.clone(),
        comicid: record.comicid.clone(),
        issueid: record.issueid.clone(),
        volume: record.volume.clone(),
        seriesyear: record.seriesyear.clone(),
        annuallink: record.link.clone(),
        format: record.format.clone(),
    }
}
