use std::collections::BTreeMap;

use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use serde::Serialize;

use crate::models::SessionRecord;

/// Local calendar day a session started on.
pub fn day_of(record: &SessionRecord) -> NaiveDate {
    record.start_time.with_timezone(&Local).date_naive()
}

/// Consecutive days with at least one session, counted backwards from `today`.
///
/// A day without sessions ends the walk, except `today` itself: an empty
/// today leaves yesterday's streak intact.
pub fn current_streak<F>(today: NaiveDate, mut has_session: F) -> u32
where
    F: FnMut(NaiveDate) -> bool,
{
    let mut streak = 0;
    let mut offset = 0;
    loop {
        let day = today - ChronoDuration::days(offset);
        if has_session(day) {
            streak += 1;
        } else if offset > 0 {
            break;
        }
        offset += 1;
    }
    streak
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FocusStats {
    pub total_sessions: usize,
    pub sessions_today: usize,
    pub total_focused_seconds: u64,
    pub streak_days: u32,
    pub journal_entries: usize,
    /// Focused minutes for the last seven days, oldest first, today last.
    pub weekly_minutes: Vec<(NaiveDate, u64)>,
}

impl FocusStats {
    pub fn from_records<'a, I>(records: I, today: NaiveDate) -> Self
    where
        I: IntoIterator<Item = &'a SessionRecord>,
    {
        let mut per_day: BTreeMap<NaiveDate, (usize, u64)> = BTreeMap::new();
        let mut stats = FocusStats::default();

        for record in records {
            stats.total_sessions += 1;
            stats.total_focused_seconds += record.focused_seconds;
            if record.has_journal() {
                stats.journal_entries += 1;
            }
            let entry = per_day.entry(day_of(record)).or_default();
            entry.0 += 1;
            entry.1 += record.focused_seconds;
        }

        stats.sessions_today = per_day.get(&today).map(|(count, _)| *count).unwrap_or(0);
        stats.streak_days = current_streak(today, |day| per_day.contains_key(&day));
        stats.weekly_minutes = (0..7)
            .rev()
            .map(|offset| {
                let day = today - ChronoDuration::days(offset);
                let seconds = per_day.get(&day).map(|(_, secs)| *secs).unwrap_or(0);
                (day, seconds / 60)
            })
            .collect();
        stats
    }
}
