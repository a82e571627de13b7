//! Badge catalogue and the pure predicates that unlock it.
//!
//! Everything here is a function of the session history and "today"; nothing
//! touches storage. Day boundaries follow the local calendar.

mod stats;

pub use stats::{current_streak, day_of, FocusStats};

use std::collections::BTreeSet;

use chrono::{NaiveDate, Timelike};
use serde::{Deserialize, Serialize};

use crate::models::SessionRecord;

const HOUR_SECS: u64 = 3600;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    #[serde(rename = "focus_1h")]
    Focus1h,
    #[serde(rename = "focus_5h")]
    Focus5h,
    #[serde(rename = "focus_10h")]
    Focus10h,
    #[serde(rename = "streak_3")]
    Streak3,
    #[serde(rename = "streak_7")]
    Streak7,
    #[serde(rename = "sessions_3")]
    Sessions3,
    #[serde(rename = "sessions_5")]
    Sessions5,
    PerfectFocus,
    #[serde(rename = "hardcore_1")]
    Hardcore1,
    #[serde(rename = "journal_5")]
    Journal5,
    EarlyBird,
    NightOwl,
}

impl Badge {
    pub const ALL: [Badge; 12] = [
        Badge::Focus1h,
        Badge::Focus5h,
        Badge::Focus10h,
        Badge::Streak3,
        Badge::Streak7,
        Badge::Sessions3,
        Badge::Sessions5,
        Badge::PerfectFocus,
        Badge::Hardcore1,
        Badge::Journal5,
        Badge::EarlyBird,
        Badge::NightOwl,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Badge::Focus1h => "focus_1h",
            Badge::Focus5h => "focus_5h",
            Badge::Focus10h => "focus_10h",
            Badge::Streak3 => "streak_3",
            Badge::Streak7 => "streak_7",
            Badge::Sessions3 => "sessions_3",
            Badge::Sessions5 => "sessions_5",
            Badge::PerfectFocus => "perfect_focus",
            Badge::Hardcore1 => "hardcore_1",
            Badge::Journal5 => "journal_5",
            Badge::EarlyBird => "early_bird",
            Badge::NightOwl => "night_owl",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|badge| badge.id() == id)
    }

    pub fn title(self) -> &'static str {
        match self {
            Badge::Focus1h => "1 Hour Focus",
            Badge::Focus5h => "5 Hour Champion",
            Badge::Focus10h => "10 Hour Master",
            Badge::Streak3 => "3-Day Streak",
            Badge::Streak7 => "7-Day Streak",
            Badge::Sessions3 => "3 Sessions Pro",
            Badge::Sessions5 => "5 Sessions Master",
            Badge::PerfectFocus => "Perfect Focus",
            Badge::Hardcore1 => "Hardcore Mode Survivor",
            Badge::Journal5 => "Reflective Mind",
            Badge::EarlyBird => "Early Bird",
            Badge::NightOwl => "Night Owl",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Badge::Focus1h => "Focused for a cumulative 1 hour",
            Badge::Focus5h => "Focused for a cumulative 5 hours",
            Badge::Focus10h => "Focused for a cumulative 10 hours",
            Badge::Streak3 => "Focused 3 days in a row",
            Badge::Streak7 => "Focused 7 days in a row",
            Badge::Sessions3 => "Completed 3 focus sessions in one day",
            Badge::Sessions5 => "Completed 5 focus sessions in one day",
            Badge::PerfectFocus => "Maintained 100% focus in a session",
            Badge::Hardcore1 => "Completed a session in Hardcore Mode",
            Badge::Journal5 => "Wrote 5 journal entries",
            Badge::EarlyBird => "Started a session before 7am",
            Badge::NightOwl => "Started a session after 10pm",
        }
    }
}

/// Badges unlocked by `new_record` on top of `history`.
///
/// `history` may or may not already contain `new_record`; it is counted once
/// either way. Already-earned badges are not filtered here.
pub fn evaluate(
    new_record: &SessionRecord,
    history: &[SessionRecord],
    today: NaiveDate,
) -> BTreeSet<Badge> {
    let mut records: Vec<&SessionRecord> = history
        .iter()
        .filter(|record| record.id != new_record.id)
        .collect();
    records.push(new_record);

    let mut earned = evaluate_history(&records, today);

    if new_record.focus_score_percent >= 100 && new_record.duration_seconds > 0 {
        earned.insert(Badge::PerfectFocus);
    }
    if new_record.hardcore {
        earned.insert(Badge::Hardcore1);
    }
    let hour = start_hour(new_record);
    if hour < 7 {
        earned.insert(Badge::EarlyBird);
    }
    if hour >= 22 {
        earned.insert(Badge::NightOwl);
    }

    earned
}

/// Aggregate-only badges, usable without a fresh session (e.g. after a
/// journal entry is added).
pub fn evaluate_history(records: &[&SessionRecord], today: NaiveDate) -> BTreeSet<Badge> {
    let stats = FocusStats::from_records(records.iter().copied(), today);
    let mut earned = BTreeSet::new();

    for (badge, hours) in [
        (Badge::Focus1h, 1),
        (Badge::Focus5h, 5),
        (Badge::Focus10h, 10),
    ] {
        if stats.total_focused_seconds >= hours * HOUR_SECS {
            earned.insert(badge);
        }
    }
    if stats.streak_days >= 3 {
        earned.insert(Badge::Streak3);
    }
    if stats.streak_days >= 7 {
        earned.insert(Badge::Streak7);
    }
    if stats.sessions_today >= 3 {
        earned.insert(Badge::Sessions3);
    }
    if stats.sessions_today >= 5 {
        earned.insert(Badge::Sessions5);
    }
    if stats.journal_entries >= 5 {
        earned.insert(Badge::Journal5);
    }

    earned
}

fn start_hour(record: &SessionRecord) -> u32 {
    record.start_time.with_timezone(&chrono::Local).hour()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::EndReason;
    use chrono::{Duration as ChronoDuration, Local, TimeZone, Utc};

    pub(crate) fn record_on(day: NaiveDate, hour: u32, focused_seconds: u64) -> SessionRecord {
        let start = Local
            .from_local_datetime(&day.and_hms_opt(hour, 0, 0).unwrap())
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        SessionRecord {
            id: format!("{day}-{hour}-{focused_seconds}"),
            start_time: start,
            end_time: start + ChronoDuration::seconds(focused_seconds as i64),
            duration_seconds: focused_seconds.max(1),
            focused_seconds,
            focus_score_percent: 80,
            hardcore: false,
            end_reason: EndReason::Finished,
            journal_text: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 15).unwrap()
    }

    #[test]
    fn cumulative_focus_thresholds() {
        let day = today();
        let history = vec![record_on(day, 10, 3 * HOUR_SECS)];
        let new = record_on(day, 14, 2 * HOUR_SECS + 60);

        let earned = evaluate(&new, &history, day);

        assert!(earned.contains(&Badge::Focus1h));
        assert!(earned.contains(&Badge::Focus5h));
        assert!(!earned.contains(&Badge::Focus10h));
    }

    #[test]
    fn new_record_already_in_history_is_counted_once() {
        let day = today();
        let new = record_on(day, 10, 40 * 60);
        let history = vec![new.clone()];

        let earned = evaluate(&new, &history, day);

        assert!(!earned.contains(&Badge::Focus1h));
    }

    #[test]
    fn sessions_today_badges() {
        let day = today();
        let history: Vec<_> = (8..12).map(|hour| record_on(day, hour, 60)).collect();
        let new = record_on(day, 13, 60);

        let earned = evaluate(&new, &history, day);

        assert!(earned.contains(&Badge::Sessions3));
        assert!(earned.contains(&Badge::Sessions5));
    }

    #[test]
    fn streak_badges_walk_back_from_today() {
        let day = today();
        let history: Vec<_> = (1..7)
            .map(|offset| record_on(day - ChronoDuration::days(offset), 12, 60))
            .collect();
        let new = record_on(day, 12, 60);

        let earned = evaluate(&new, &history, day);

        assert!(earned.contains(&Badge::Streak3));
        assert!(earned.contains(&Badge::Streak7));
    }

    #[test]
    fn per_session_badges() {
        let day = today();
        let mut new = record_on(day, 6, 600);
        new.focus_score_percent = 100;
        new.hardcore = true;

        let earned = evaluate(&new, &[], day);

        assert!(earned.contains(&Badge::PerfectFocus));
        assert!(earned.contains(&Badge::Hardcore1));
        assert!(earned.contains(&Badge::EarlyBird));
        assert!(!earned.contains(&Badge::NightOwl));

        let late = record_on(day, 23, 600);
        assert!(evaluate(&late, &[], day).contains(&Badge::NightOwl));
    }

    #[test]
    fn journal_badge_needs_five_entries() {
        let day = today();
        let mut history: Vec<_> = (0..4)
            .map(|offset| {
                let mut record = record_on(day - ChronoDuration::days(offset), 12, 60);
                record.journal_text = Some("went well".into());
                record
            })
            .collect();
        let refs: Vec<_> = history.iter().collect();
        assert!(!evaluate_history(&refs, day).contains(&Badge::Journal5));

        let mut fifth = record_on(day, 15, 60);
        fifth.journal_text = Some("reflection".into());
        history.push(fifth);
        let refs: Vec<_> = history.iter().collect();
        assert!(evaluate_history(&refs, day).contains(&Badge::Journal5));
    }

    #[test]
    fn badge_ids_match_serialized_names() {
        for badge in Badge::ALL {
            assert_eq!(Badge::from_id(badge.id()), Some(badge));
            let json = serde_json::to_string(&badge).unwrap();
            assert_eq!(json, format!("\"{}\"", badge.id()));
        }
        assert_eq!(Badge::from_id("nope"), None);
    }
}
