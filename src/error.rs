use std::time::Duration;

use thiserror::Error;

use crate::blocker::BlockError;

/// Failures and rejections surfaced by the session core.
///
/// `HardcoreLocked` is not a fault: it reports a stop request that was refused
/// while the hardcore lock window is still open.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("camera disconnected: {0}")]
    CameraDisconnected(String),
    #[error("site blocking needs elevated permissions: {0}")]
    SiteBlockPermissionDenied(String),
    #[error("site blocking failed: {0}")]
    SiteBlockFailed(String),
    #[error("hardcore mode is locked for another {}s", remaining.as_secs())]
    HardcoreLocked { remaining: Duration },
    #[error("failed to persist session: {0}")]
    PersistenceFailure(String),
    #[error("a focus session is already active")]
    AlreadyActive,
    #[error("no active focus session")]
    NoActiveSession,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<BlockError> for SessionError {
    fn from(err: BlockError) -> Self {
        match &err {
            BlockError::PermissionDenied { .. } => {
                SessionError::SiteBlockPermissionDenied(err.to_string())
            }
            BlockError::Io { .. } => SessionError::SiteBlockFailed(err.to_string()),
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
