pub const SCHEMA: &str = r#"
-- weekly release schedule, one row per issue shipping in a given week
CREATE TABLE IF NOT EXISTS weekly (
    rowid INTEGER PRIMARY KEY,
    shipdate TEXT,
    publisher TEXT,
    issue TEXT NOT NULL,
    comic VARCHAR(150) NOT NULL,
    extra TEXT,
    status TEXT,
    comicid TEXT,
    issueid TEXT,
    cv_last_update TEXT,
    dynamicname TEXT NOT NULL,
    weeknumber INTEGER NOT NULL,
    year INTEGER NOT NULL,
    volume TEXT,
    seriesyear TEXT,
    annuallink TEXT,
    format TEXT
);

CREATE INDEX IF NOT EXISTS idx_weekly_week_year ON weekly(weeknumber, year);
CREATE INDEX IF NOT EXISTS idx_weekly_match ON weekly(dynamicname, issue);
"#;
