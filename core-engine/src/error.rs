use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Track duration must be positive, got {duration_secs}")]
    InvalidDuration { duration_secs: f64 },

    #[error("Player failed to prepare the track: {0}")]
    PrepareFailed(String),

    #[error("Playback failed: {0}")]
    PlaybackFailed(String),

    #[error("A play-count session is already running")]
    AlreadyRunning,

    #[error("Invalid session ID: {0}")]
    InvalidSessionId(String),

    #[error("Invalid run state: {0}")]
    InvalidRunState(String),

    #[error("Invalid sync mode: {0}")]
    InvalidSyncMode(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
