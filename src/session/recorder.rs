use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};

use crate::{
    badges::{self, Badge},
    db::Database,
    models::SessionRecord,
};

/// Storage for finished sessions and the badges they unlocked.
#[async_trait]
pub trait SessionRecorder: Send + Sync {
    async fn save(&self, record: &SessionRecord) -> Result<String>;

    /// Sessions started at or after `since`; every session for `None`.
    async fn history(&self, since: Option<DateTime<Utc>>) -> Result<Vec<SessionRecord>>;

    /// `None` clears the entry.
    async fn set_journal(&self, session_id: &str, text: Option<String>) -> Result<()>;

    async fn earned_badges(&self) -> Result<Vec<Badge>>;

    /// Persists `badges`, returning the ones that were not already earned.
    async fn award_badges(&self, badges: &[Badge], at: DateTime<Utc>) -> Result<Vec<Badge>>;
}

#[async_trait]
impl SessionRecorder for Database {
    async fn save(&self, record: &SessionRecord) -> Result<String> {
        self.insert_session(record).await?;
        Ok(record.id.clone())
    }

    async fn history(&self, since: Option<DateTime<Utc>>) -> Result<Vec<SessionRecord>> {
        self.list_sessions_since(since).await
    }

    async fn set_journal(&self, session_id: &str, text: Option<String>) -> Result<()> {
        self.update_session_journal(session_id, text).await
    }

    async fn earned_badges(&self) -> Result<Vec<Badge>> {
        Ok(self
            .list_badges()
            .await?
            .into_iter()
            .map(|earned| earned.badge)
            .collect())
    }

    async fn award_badges(&self, badges: &[Badge], at: DateTime<Utc>) -> Result<Vec<Badge>> {
        self.insert_badges(badges, at).await
    }
}

/// Saves a completed session and awards whatever it newly unlocked.
pub async fn archive_session(
    recorder: &dyn SessionRecorder,
    record: &SessionRecord,
) -> Result<Vec<Badge>> {
    recorder
        .save(record)
        .await
        .with_context(|| format!("failed to save session {}", record.id))?;

    let history = recorder
        .history(None)
        .await
        .context("failed to load session history")?;
    let today = Local::now().date_naive();
    let unlocked = badges::evaluate(record, &history, today);

    let already = recorder.earned_badges().await?;
    let fresh: Vec<Badge> = unlocked
        .into_iter()
        .filter(|badge| !already.contains(badge))
        .collect();
    if fresh.is_empty() {
        return Ok(fresh);
    }

    recorder
        .award_badges(&fresh, record.end_time)
        .await
        .context("failed to award badges")
}

/// Re-checks the history-only badges, e.g. after a journal entry is added.
pub async fn refresh_badges(recorder: &dyn SessionRecorder) -> Result<Vec<Badge>> {
    let history = recorder.history(None).await?;
    let records: Vec<&SessionRecord> = history.iter().collect();
    let unlocked = badges::evaluate_history(&records, Local::now().date_naive());

    let already = recorder.earned_badges().await?;
    let fresh: Vec<Badge> = unlocked
        .into_iter()
        .filter(|badge| !already.contains(badge))
        .collect();
    if fresh.is_empty() {
        return Ok(fresh);
    }
    recorder.award_badges(&fresh, Utc::now()).await
}

/// Stores a journal entry for a finished session; blank text removes it.
pub async fn write_journal(
    recorder: &dyn SessionRecorder,
    session_id: &str,
    text: &str,
) -> Result<Vec<Badge>> {
    let text = Some(text.trim().to_string()).filter(|text| !text.is_empty());
    recorder
        .set_journal(session_id, text)
        .await
        .with_context(|| format!("failed to update journal for session {session_id}"))?;
    refresh_badges(recorder).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EndReason;
    use chrono::Duration as ChronoDuration;

    fn record(id: &str, focused_seconds: u64, hardcore: bool) -> SessionRecord {
        let start = Utc::now() - ChronoDuration::seconds(focused_seconds as i64);
        SessionRecord {
            id: id.into(),
            start_time: start,
            end_time: Utc::now(),
            duration_seconds: focused_seconds,
            focused_seconds,
            focus_score_percent: 100,
            hardcore,
            end_reason: EndReason::Finished,
            journal_text: None,
        }
    }

    #[tokio::test]
    async fn archive_awards_new_badges_once() {
        let db = Database::in_memory().unwrap();

        let first = archive_session(&db, &record("a", 600, true)).await.unwrap();
        assert!(first.contains(&Badge::Hardcore1));
        assert!(first.contains(&Badge::PerfectFocus));

        let second = archive_session(&db, &record("b", 600, true)).await.unwrap();
        assert!(!second.contains(&Badge::Hardcore1));
        assert_eq!(db.list_sessions_since(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn journal_for_unknown_session_fails() {
        let db = Database::in_memory().unwrap();
        assert!(write_journal(&db, "missing", "text").await.is_err());
    }

    #[tokio::test]
    async fn journal_badge_is_picked_up_by_refresh() {
        let db = Database::in_memory().unwrap();
        for index in 0..5 {
            db.insert_session(&record(&format!("s{index}"), 60, false))
                .await
                .unwrap();
        }
        // Session-count badges are settled before any journal is written.
        refresh_badges(&db).await.unwrap();
        for index in 0..4 {
            let id = format!("s{index}");
            assert!(write_journal(&db, &id, "notes").await.unwrap().is_empty());
        }

        let fresh = write_journal(&db, "s4", "  last one ").await.unwrap();

        assert_eq!(fresh, vec![Badge::Journal5]);
        assert!(refresh_badges(&db).await.unwrap().is_empty());
        let stored = db.get_session("s4").await.unwrap().unwrap();
        assert_eq!(stored.journal_text.as_deref(), Some("last one"));
    }
}
