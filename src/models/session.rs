use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a session reached `Completed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    /// The selected duration ran out.
    Finished,
    /// The user asked to stop.
    Stopped,
    /// The camera stopped delivering frames outside hardcore mode.
    CameraDisconnected,
    /// The process shut down with the session still active.
    Interrupted,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Finished => "Finished",
            EndReason::Stopped => "Stopped",
            EndReason::CameraDisconnected => "CameraDisconnected",
            EndReason::Interrupted => "Interrupted",
        }
    }
}

/// Archived outcome of one focus session. Immutable once built; the journal
/// text is the only field edited after the fact, through the recorder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: u64,
    pub focused_seconds: u64,
    pub focus_score_percent: u8,
    pub hardcore: bool,
    pub end_reason: EndReason,
    pub journal_text: Option<String>,
}

impl SessionRecord {
    pub fn has_journal(&self) -> bool {
        self.journal_text
            .as_deref()
            .map(|text| !text.trim().is_empty())
            .unwrap_or(false)
    }
}
