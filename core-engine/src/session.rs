//! # Playback Session State Machine
//!
//! Tracks a single play-count session's lifecycle with validated state
//! transitions.
//!
//! ## State Machine
//!
//! ```text
//! Idle → Preparing → Playing → AdvancingGap → Completed
//!              ↑         ⇅          │
//!              │       Paused       │
//!              └────────────────────┘   (next iteration)
//!
//! Any non-terminal state → Stopped | Failed
//! ```
//!
//! An iteration is accounted exactly once: the only place the iteration
//! counter moves is [`PlaybackSession::finish_iteration`], which is only
//! legal from `Playing`.

use crate::{
    planner::SyncMode,
    EngineError, Result,
};
use bridge_traits::PlaybackTarget;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a play-count session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a session ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| EngineError::InvalidSessionId(e.to_string()))?,
        ))
    }

    /// Get the string representation of this ID
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<SessionId> for Uuid {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

// ============================================================================
// Track
// ============================================================================

/// A track as known to the host platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Platform identifier for the track
    pub id: String,
    /// Display title
    pub title: String,
    /// Display artist string
    pub artist: String,
    /// Total duration in seconds
    pub duration_secs: f64,
    /// Play count at the time the track was loaded
    pub play_count: u32,
}

impl Track {
    /// Create a new track descriptor
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        duration_secs: f64,
        play_count: u32,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            duration_secs,
            play_count,
        }
    }

    /// Validate that the track can be driven through playback
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidDuration`] when the duration is zero,
    /// negative, or not a number
    pub fn validate(&self) -> Result<()> {
        if !(self.duration_secs > 0.0) {
            return Err(EngineError::InvalidDuration {
                duration_secs: self.duration_secs,
            });
        }
        Ok(())
    }

    /// Build the playback target handed to the player port
    pub fn playback_target(&self) -> PlaybackTarget {
        PlaybackTarget::new(
            self.id.clone(),
            self.title.clone(),
            self.artist.clone(),
            Duration::from_secs_f64(self.duration_secs.max(0.0)),
        )
    }
}

// ============================================================================
// Run State
// ============================================================================

/// The current run state of a play-count session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Session has been created but playback has not started
    Idle,
    /// The player is loading and preparing the track
    Preparing,
    /// The track is audibly playing
    Playing,
    /// Playback is paused at the user's request
    Paused,
    /// An iteration finished; waiting out the settle gap before the next
    AdvancingGap,
    /// All planned iterations finished
    Completed,
    /// The user stopped the session early
    Stopped,
    /// The session aborted on an error
    Failed,
}

impl RunState {
    /// Check if this state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Stopped | RunState::Failed
        )
    }

    /// Check if this state represents an in-flight session
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Get the string representation of this state
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Preparing => "preparing",
            RunState::Playing => "playing",
            RunState::Paused => "paused",
            RunState::AdvancingGap => "advancing_gap",
            RunState::Completed => "completed",
            RunState::Stopped => "stopped",
            RunState::Failed => "failed",
        }
    }
}

impl FromStr for RunState {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(RunState::Idle),
            "preparing" => Ok(RunState::Preparing),
            "playing" => Ok(RunState::Playing),
            "paused" => Ok(RunState::Paused),
            "advancing_gap" => Ok(RunState::AdvancingGap),
            "completed" => Ok(RunState::Completed),
            "stopped" => Ok(RunState::Stopped),
            "failed" => Ok(RunState::Failed),
            _ => Err(EngineError::InvalidRunState(s.to_string())),
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Playback Session Entity
// ============================================================================

/// A play-count session with state machine semantics
///
/// Sessions are created in `Idle` state with the iteration plan already
/// fixed; the count snapshots taken at planning time are never revisited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSession {
    /// Unique identifier for this session
    pub id: SessionId,
    /// The track being driven through repeated playback
    pub track: Track,
    /// The mode the plan was computed under
    pub mode: SyncMode,
    /// Number of iterations the plan calls for
    pub total_iterations: u32,
    /// Number of iterations accounted so far
    pub current_iteration: u32,
    /// Play count the target should show when the session completes
    pub projected_final_count: u32,
    /// Current run state
    pub run_state: RunState,
    /// Error message if the session failed
    pub failure: Option<String>,
    /// When the session was created
    pub created_at: i64,
    /// When playback of the first iteration began
    pub started_at: Option<i64>,
    /// When the session reached a terminal state
    pub finished_at: Option<i64>,
}

impl PlaybackSession {
    /// Create a new session in idle state
    pub fn new(
        track: Track,
        mode: SyncMode,
        total_iterations: u32,
        projected_final_count: u32,
    ) -> Self {
        Self {
            id: SessionId::new(),
            track,
            mode,
            total_iterations,
            current_iteration: 0,
            projected_final_count,
            run_state: RunState::Idle,
            failure: None,
            created_at: current_timestamp(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Number of iterations still to run
    pub fn remaining_iterations(&self) -> u32 {
        self.total_iterations.saturating_sub(self.current_iteration)
    }

    /// Begin preparing the next iteration
    ///
    /// # Errors
    ///
    /// Returns an error unless the session is `Idle` or in the settle gap
    pub fn begin_preparing(&mut self) -> Result<()> {
        self.validate_transition(RunState::Preparing)?;
        self.run_state = RunState::Preparing;
        Ok(())
    }

    /// Mark playback as audibly running
    ///
    /// # Errors
    ///
    /// Returns an error unless the session is `Preparing` or `Paused`
    pub fn begin_playing(&mut self) -> Result<()> {
        self.validate_transition(RunState::Playing)?;
        self.run_state = RunState::Playing;
        if self.started_at.is_none() {
            self.started_at = Some(current_timestamp());
        }
        Ok(())
    }

    /// Pause playback at the user's request
    ///
    /// # Errors
    ///
    /// Returns an error unless the session is `Playing`
    pub fn pause(&mut self) -> Result<()> {
        self.validate_transition(RunState::Paused)?;
        self.run_state = RunState::Paused;
        Ok(())
    }

    /// Account the current iteration and enter the settle gap
    ///
    /// This is the only place the iteration counter moves.
    ///
    /// # Errors
    ///
    /// Returns an error unless the session is `Playing`
    pub fn finish_iteration(&mut self) -> Result<()> {
        self.validate_transition(RunState::AdvancingGap)?;
        self.run_state = RunState::AdvancingGap;
        self.current_iteration += 1;
        Ok(())
    }

    /// Mark the session as completed
    ///
    /// # Errors
    ///
    /// Returns an error unless all iterations have been accounted
    pub fn complete(&mut self) -> Result<()> {
        self.validate_transition(RunState::Completed)?;
        if self.current_iteration < self.total_iterations {
            return Err(EngineError::InvalidStateTransition {
                from: self.run_state.as_str().to_string(),
                to: RunState::Completed.as_str().to_string(),
                reason: format!(
                    "{} of {} iterations accounted",
                    self.current_iteration, self.total_iterations
                ),
            });
        }
        self.run_state = RunState::Completed;
        self.finished_at = Some(current_timestamp());
        Ok(())
    }

    /// Stop the session at the user's request
    ///
    /// # Errors
    ///
    /// Returns an error if the session is already terminal
    pub fn stop(&mut self) -> Result<()> {
        self.validate_transition(RunState::Stopped)?;
        self.run_state = RunState::Stopped;
        self.finished_at = Some(current_timestamp());
        Ok(())
    }

    /// Mark the session as failed with an error message
    ///
    /// # Errors
    ///
    /// Returns an error if the session is already terminal
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.validate_transition(RunState::Failed)?;
        self.run_state = RunState::Failed;
        self.failure = Some(reason.into());
        self.finished_at = Some(current_timestamp());
        Ok(())
    }

    /// Get the duration of the session in seconds
    ///
    /// Returns None if the session hasn't started or finished yet
    pub fn duration_secs(&self) -> Option<u64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start) as u64),
            _ => None,
        }
    }

    /// Validate a state transition
    fn validate_transition(&self, to: RunState) -> Result<()> {
        let valid = match (self.run_state, to) {
            // From Idle
            (RunState::Idle, RunState::Preparing) => true,
            // A zero-iteration plan is complete without ever playing
            (RunState::Idle, RunState::Completed) => true,

            // From Preparing
            (RunState::Preparing, RunState::Playing) => true,

            // From Playing
            (RunState::Playing, RunState::Paused) => true,
            (RunState::Playing, RunState::AdvancingGap) => true,

            // From Paused
            (RunState::Paused, RunState::Playing) => true,

            // From the settle gap
            (RunState::AdvancingGap, RunState::Preparing) => true,
            (RunState::AdvancingGap, RunState::Completed) => true,

            // Any non-terminal state can be stopped or failed
            (from, RunState::Stopped) if !from.is_terminal() => true,
            (from, RunState::Failed) if !from.is_terminal() => true,

            // Terminal states cannot transition
            (from, _) if from.is_terminal() => false,

            // All other transitions are invalid
            _ => false,
        };

        if !valid {
            return Err(EngineError::InvalidStateTransition {
                from: self.run_state.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.run_state.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}

/// Get current Unix timestamp
fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System time before UNIX epoch")
        .as_secs() as i64
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn session(total: u32) -> PlaybackSession {
        PlaybackSession::new(
            Track::new("track-1", "Song", "Artist", 300.0, 30),
            SyncMode::Match,
            total,
            50,
        )
    }

    #[test]
    fn test_session_id_new() {
        let id1 = SessionId::new();
        let id2 = SessionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_session_id_from_string() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let id = SessionId::from_string(uuid_str).unwrap();
        assert_eq!(id.as_str(), uuid_str);
        assert!(SessionId::from_string("not-a-uuid").is_err());
    }

    #[test]
    fn test_track_validate() {
        assert!(Track::new("t", "a", "b", 180.0, 0).validate().is_ok());
        assert!(Track::new("t", "a", "b", 0.0, 0).validate().is_err());
        assert!(Track::new("t", "a", "b", -1.0, 0).validate().is_err());
        assert!(Track::new("t", "a", "b", f64::NAN, 0).validate().is_err());
    }

    #[test]
    fn test_run_state_is_terminal() {
        assert!(!RunState::Idle.is_terminal());
        assert!(!RunState::Playing.is_terminal());
        assert!(!RunState::Paused.is_terminal());
        assert!(!RunState::AdvancingGap.is_terminal());
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Stopped.is_terminal());
        assert!(RunState::Failed.is_terminal());
    }

    #[test]
    fn test_run_state_round_trip() {
        for state in [
            RunState::Idle,
            RunState::Preparing,
            RunState::Playing,
            RunState::Paused,
            RunState::AdvancingGap,
            RunState::Completed,
            RunState::Stopped,
            RunState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<RunState>().unwrap(), state);
        }
        assert!("spinning".parse::<RunState>().is_err());
    }

    #[test]
    fn test_new_session_is_idle() {
        let s = session(3);
        assert_eq!(s.run_state, RunState::Idle);
        assert_eq!(s.current_iteration, 0);
        assert_eq!(s.remaining_iterations(), 3);
        assert!(s.started_at.is_none());
        assert!(s.finished_at.is_none());
    }

    #[test]
    fn test_full_iteration_cycle() {
        let mut s = session(2);

        s.begin_preparing().unwrap();
        s.begin_playing().unwrap();
        assert!(s.started_at.is_some());
        s.finish_iteration().unwrap();
        assert_eq!(s.current_iteration, 1);
        assert_eq!(s.run_state, RunState::AdvancingGap);

        s.begin_preparing().unwrap();
        s.begin_playing().unwrap();
        s.finish_iteration().unwrap();
        assert_eq!(s.current_iteration, 2);

        s.complete().unwrap();
        assert_eq!(s.run_state, RunState::Completed);
        assert!(s.finished_at.is_some());
    }

    #[test]
    fn test_iteration_only_accounted_while_playing() {
        let mut s = session(2);
        assert!(s.finish_iteration().is_err());

        s.begin_preparing().unwrap();
        assert!(s.finish_iteration().is_err());

        s.begin_playing().unwrap();
        s.finish_iteration().unwrap();

        // A second account without replaying is rejected
        assert!(s.finish_iteration().is_err());
        assert_eq!(s.current_iteration, 1);
    }

    #[test]
    fn test_pause_resume() {
        let mut s = session(1);
        s.begin_preparing().unwrap();
        s.begin_playing().unwrap();

        s.pause().unwrap();
        assert_eq!(s.run_state, RunState::Paused);

        // Cannot pause twice or account while paused
        assert!(s.pause().is_err());
        assert!(s.finish_iteration().is_err());

        s.begin_playing().unwrap();
        assert_eq!(s.run_state, RunState::Playing);
    }

    #[test]
    fn test_complete_requires_all_iterations() {
        let mut s = session(2);
        s.begin_preparing().unwrap();
        s.begin_playing().unwrap();
        s.finish_iteration().unwrap();

        // Only 1 of 2 accounted
        assert!(s.complete().is_err());
        assert_eq!(s.run_state, RunState::AdvancingGap);
    }

    #[test]
    fn test_zero_iteration_plan_completes_from_idle() {
        let mut s = session(0);
        s.complete().unwrap();
        assert_eq!(s.run_state, RunState::Completed);
    }

    #[test]
    fn test_stop_from_any_active_state() {
        let mut s = session(3);
        s.stop().unwrap();
        assert_eq!(s.run_state, RunState::Stopped);

        let mut s = session(3);
        s.begin_preparing().unwrap();
        s.begin_playing().unwrap();
        s.pause().unwrap();
        s.stop().unwrap();
        assert_eq!(s.run_state, RunState::Stopped);
        assert!(s.finished_at.is_some());
    }

    #[test]
    fn test_fail_records_reason() {
        let mut s = session(1);
        s.begin_preparing().unwrap();
        s.fail("player exploded").unwrap();
        assert_eq!(s.run_state, RunState::Failed);
        assert_eq!(s.failure.as_deref(), Some("player exploded"));
    }

    #[test]
    fn test_terminal_states_cannot_transition() {
        let mut s = session(1);
        s.stop().unwrap();

        assert!(s.begin_preparing().is_err());
        assert!(s.fail("late error").is_err());
        assert!(s.stop().is_err());
        assert!(s.complete().is_err());
    }
}
