use rusqlite::{params, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{NormalizedRecord, ScheduleRow, DEFAULT_STATUS};
use crate::week::WeekKey;

use super::schema::SCHEMA;

/// Row counts from one `replace_week` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekReplacement {
    pub removed: usize,
    pub written: usize,
}

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::with_connection(conn).await
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::with_connection(conn).await
    }

    async fn with_connection(conn: Connection) -> Result<Self> {
        let repository = Self { conn };
        repository.ensure_schema().await?;
        Ok(repository)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Schedule operations

    /// Drops every row stored for `key` and writes `records` in their place.
    ///
    /// Rows are matched on (dynamicname, issue), so a record that already
    /// exists under another week is moved rather than duplicated.
    pub async fn replace_week(
        &self,
        key: WeekKey,
        records: Vec<NormalizedRecord>,
    ) -> Result<WeekReplacement> {
        let replacement = self
            .conn
            .call(move |conn| {
                conn.execute_batch(SCHEMA)?;
                let tx = conn.transaction()?;
                let removed = tx.execute(
                    "DELETE FROM weekly WHERE weeknumber = ?1 AND year = ?2",
                    params![key.week, key.year],
                )?;
                for record in &records {
                    upsert_release(&tx, key, record)?;
                }
                tx.commit()?;
                Ok(WeekReplacement {
                    removed,
                    written: records.len(),
                })
            })
            .await?;
        Ok(replacement)
    }

    pub async fn rows_for_week(&self, key: WeekKey) -> Result<Vec<ScheduleRow>> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT rowid, shipdate, publisher, issue, comic, extra, status, comicid,
                              issueid, cv_last_update, dynamicname, weeknumber, year, volume,
                              seriesyear, annuallink, format
                       FROM weekly
                       WHERE weeknumber = ?1 AND year = ?2
                       ORDER BY publisher, comic, issue"#,
                )?;
                let rows = stmt
                    .query_map(params![key.week, key.year], schedule_row_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    #[cfg(test)]
    pub async fn count_for_week(&self, key: WeekKey) -> Result<usize> {
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM weekly WHERE weeknumber = ?1 AND year = ?2",
                    params![key.week, key.year],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count as usize)
    }
}

fn upsert_release(
    conn: &rusqlite::Connection,
    key: WeekKey,
    record: &NormalizedRecord,
) -> rusqlite::Result<()> {
    let updated = conn.execute(
        r#"UPDATE weekly SET
               shipdate = ?1, publisher = ?2, status = ?3, comic = ?4, comicid = ?5,
               issueid = ?6, weeknumber = ?7, year = ?8, annuallink = ?9, volume = ?10,
               seriesyear = ?11, format = ?12
           WHERE dynamicname = ?13 AND issue = ?14"#,
        params![
            record.shipdate,
            record.publisher,
            DEFAULT_STATUS,
            record.comic,
            record.comicid,
            record.issueid,
            key.week,
            key.year,
            record.annuallink,
            record.volume,
            record.seriesyear,
            record.format,
            record.dynamic_name,
            record.issue,
        ],
    )?;

    if updated == 0 {
        conn.execute(
            r#"INSERT INTO weekly (shipdate, publisher, status, comic, comicid, issueid,
                                   weeknumber, year, annuallink, volume, seriesyear, format,
                                   dynamicname, issue)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"#,
            params![
                record.shipdate,
                record.publisher,
                DEFAULT_STATUS,
                record.comic,
                record.comicid,
                record.issueid,
                key.week,
                key.year,
                record.annuallink,
                record.volume,
                record.seriesyear,
                record.format,
                record.dynamic_name,
                record.issue,
            ],
        )?;
    }
    Ok(())
}

fn schedule_row_from_row(row: &Row) -> rusqlite::Result<ScheduleRow> {
    Ok(ScheduleRow {
        rowid: row.get(0)?,
        shipdate: row.get(1)?,
        publisher: row.get(2)?,
        issue: row.get(3)?,
        comic: row.get(4)?,
        extra: row.get(5)?,
        status: row.get(6)?,
        comicid: row.get(7)?,
        issueid: row.get(8)?,
        cv_last_update: row.get(9)?,
        dynamic_name: row.get(10)?,
        weeknumber: row.get(11)?,
        year: row.get(12)?,
        volume: row.get(13)?,
        seriesyear: row.get(14)?,
        annuallink: row.get(15)?,
        format: row.get(16)?,
    })
}
