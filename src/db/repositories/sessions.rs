use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::{
    db::{
        helpers::{parse_datetime, parse_end_reason, to_i64, to_u64},
        Database,
    },
    models::SessionRecord,
};

const SESSION_COLUMNS: &str = "id, started_at, ended_at, duration_seconds, focused_seconds, \
                               focus_score, hardcore, end_reason, journal_text";

fn row_to_record(row: &Row) -> Result<SessionRecord> {
    let started_at: String = row.get("started_at")?;
    let ended_at: String = row.get("ended_at")?;
    let duration_seconds: i64 = row.get("duration_seconds")?;
    let focused_seconds: i64 = row.get("focused_seconds")?;
    let focus_score: i64 = row.get("focus_score")?;
    let end_reason: String = row.get("end_reason")?;

    Ok(SessionRecord {
        id: row.get("id")?,
        start_time: parse_datetime(&started_at, "started_at")?,
        end_time: parse_datetime(&ended_at, "ended_at")?,
        duration_seconds: to_u64(duration_seconds, "duration_seconds")?,
        focused_seconds: to_u64(focused_seconds, "focused_seconds")?,
        focus_score_percent: u8::try_from(focus_score.clamp(0, 100))?,
        hardcore: row.get::<_, i64>("hardcore")? != 0,
        end_reason: parse_end_reason(&end_reason)?,
        journal_text: row.get("journal_text")?,
    })
}

impl Database {
    /// Inserts the record, replacing an earlier copy with the same id.
    pub async fn insert_session(&self, record: &SessionRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO sessions
                 (id, started_at, ended_at, duration_seconds, focused_seconds, focus_score, hardcore, end_reason, journal_text)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id,
                    record.start_time.to_rfc3339(),
                    record.end_time.to_rfc3339(),
                    to_i64(record.duration_seconds)?,
                    to_i64(record.focused_seconds)?,
                    i64::from(record.focus_score_percent),
                    i64::from(record.hardcore),
                    record.end_reason.as_str(),
                    record.journal_text,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"
            ))?;
            let mut rows = stmt.query(params![session_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_record(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Sessions started at or after `since` (all of them for `None`), oldest first.
    pub async fn list_sessions_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SessionRecord>> {
        self.execute(move |conn| {
            let mut sessions = Vec::new();
            match since {
                Some(since) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SESSION_COLUMNS} FROM sessions
                         WHERE started_at >= ?1
                         ORDER BY started_at ASC"
                    ))?;
                    let mut rows = stmt.query(params![since.to_rfc3339()])?;
                    while let Some(row) = rows.next()? {
                        sessions.push(row_to_record(row)?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY started_at ASC"
                    ))?;
                    let mut rows = stmt.query([])?;
                    while let Some(row) = rows.next()? {
                        sessions.push(row_to_record(row)?);
                    }
                }
            }
            Ok(sessions)
        })
        .await
    }

    pub async fn update_session_journal(&self, session_id: &str, text: Option<String>) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE sessions
                 SET journal_text = ?1,
                     journal_updated_at = ?2
                 WHERE id = ?3",
                params![text, Utc::now().to_rfc3339(), session_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("Session not found"));
            }
            Ok(())
        })
        .await
    }

    /// Drops all sessions and earned badges.
    pub async fn reset_stats(&self) -> Result<()> {
        self.execute(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM badges", [])?;
            tx.execute("DELETE FROM sessions", [])?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
