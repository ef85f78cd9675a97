use serde::Serialize;

/// Status every schedule row gets when it is (re)written.
pub const DEFAULT_STATUS: &str = "Skipped";

/// A row of the `weekly` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleRow {
    pub rowid: i64,
    pub shipdate: Option<String>,
    pub publisher: Option<String>,
    pub issue: String,
    pub comic: String,
    pub extra: Option<String>,
    pub status: Option<String>,
    pub comicid: Option<String>,
    pub issueid: Option<String>,
    pub cv_last_update: Option<String>,
    pub dynamic_name: String,
    pub weeknumber: u32,
    pub year: i32,
    pub volume: Option<String>,
    pub seriesyear: Option<String>,
    pub annuallink: Option<String>,
    pub format: Option<String>,
}
