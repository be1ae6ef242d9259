//! # Sync Engine
//!
//! The facade the host application talks to.
//!
//! ## Overview
//!
//! The engine owns at most one running session at a time. Starting a sync
//! validates the track, computes the iteration plan, and either reports a
//! no-op immediately or spawns an [`IterationController`] on its own task.
//! Pause, resume, and stop are delivered to that task through a command
//! channel and a cancellation token, so the caller never blocks on the
//! player.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_engine::{EngineConfig, SyncEngine, SyncMode, Track};
//! use core_runtime::events::EventBus;
//! use std::sync::Arc;
//!
//! let engine = SyncEngine::new(EngineConfig::default(), port, EventBus::default())?;
//!
//! let track = Track::new("track-1", "Song", "Artist", 300.0, 30);
//! if let Some(session_id) = engine.start(track, SyncMode::Match, 50, 30).await? {
//!     // observe progress
//!     let mut status = engine.subscribe_status();
//!     status.wait_for(|s| s.run_state.is_terminal()).await?;
//! }
//! ```

use crate::{
    controller::{EngineCommand, IterationController},
    planner::{self, SyncMode},
    session::{PlaybackSession, RunState, SessionId, Track},
    EngineError, Result,
};
use bridge_traits::PlaybackPort;
use core_runtime::events::{CoreEvent, EngineEvent, EventBus};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

// ============================================================================
// Configuration
// ============================================================================

/// Tunables for session playback
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Seconds a track must audibly play before the platform credits a play
    pub min_play_duration_secs: u64,
    /// Milliseconds to wait between iterations so the platform can settle
    pub settle_delay_ms: u64,
    /// How close to the end of the track an unsolicited pause still counts
    /// as track completion, in seconds
    pub natural_pause_window_secs: u64,
    /// Floor for the re-armed timer when resuming right at the boundary,
    /// in milliseconds
    pub resume_epsilon_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_play_duration_secs: 32,
            settle_delay_ms: 1_000,
            natural_pause_window_secs: 2,
            resume_epsilon_ms: 250,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the minimum play duration is zero
    pub fn validate(&self) -> Result<()> {
        if self.min_play_duration_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "min_play_duration_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Published Status
// ============================================================================

/// Snapshot of engine state published on the status watch channel
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    /// Identifier of the session this snapshot describes, if any
    pub session_id: Option<SessionId>,
    /// Run state of that session
    pub run_state: RunState,
    /// Iterations accounted so far
    pub current_iteration: u32,
    /// Iterations the plan calls for
    pub total_iterations: u32,
    /// True from session start until a terminal state is reached
    pub is_processing: bool,
    /// True only while the track is audibly playing
    pub is_playing: bool,
    /// User-facing outcome message, set on terminal states and no-op plans
    pub completion_message: Option<String>,
}

impl SessionStatus {
    /// Status before any session has run
    pub fn idle() -> Self {
        Self {
            session_id: None,
            run_state: RunState::Idle,
            current_iteration: 0,
            total_iterations: 0,
            is_processing: false,
            is_playing: false,
            completion_message: None,
        }
    }

    pub(crate) fn from_session(session: &PlaybackSession, message: Option<String>) -> Self {
        Self {
            session_id: Some(session.id),
            run_state: session.run_state,
            current_iteration: session.current_iteration,
            total_iterations: session.total_iterations,
            is_processing: session.run_state.is_active(),
            is_playing: session.run_state == RunState::Playing,
            completion_message: message,
        }
    }
}

// ============================================================================
// Sync Engine
// ============================================================================

/// Handle to the controller task of the running session
struct ActiveSession {
    session_id: SessionId,
    commands: mpsc::UnboundedSender<EngineCommand>,
    cancel: CancellationToken,
}

/// Drives play-count synchronization sessions against a playback port
pub struct SyncEngine {
    config: EngineConfig,
    port: Arc<dyn PlaybackPort>,
    event_bus: EventBus,
    status: watch::Sender<SessionStatus>,
    active: Arc<Mutex<Option<ActiveSession>>>,
}

impl SyncEngine {
    /// Create a new engine over the given playback port
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    pub fn new(
        config: EngineConfig,
        port: Arc<dyn PlaybackPort>,
        event_bus: EventBus,
    ) -> Result<Self> {
        config.validate()?;
        let (status, _) = watch::channel(SessionStatus::idle());
        Ok(Self {
            config,
            port,
            event_bus,
            status,
            active: Arc::new(Mutex::new(None)),
        })
    }

    /// Start a sync session for the given track and count snapshots
    ///
    /// The counts are read once, here; they are never revisited while the
    /// session runs. Returns `Ok(None)` when the plan requires no playback,
    /// in which case the reason is published as the completion message.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyRunning`] if a session is in flight,
    /// or [`EngineError::InvalidDuration`] for an unplayable track.
    #[instrument(skip(self, track), fields(track_id = %track.id, %mode))]
    pub async fn start(
        &self,
        track: Track,
        mode: SyncMode,
        source_count: u32,
        target_count: u32,
    ) -> Result<Option<SessionId>> {
        track.validate()?;

        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let plan = planner::plan(mode, source_count, target_count);
        if plan.is_noop() {
            let reason = plan
                .noop_reason
                .unwrap_or_else(|| "nothing to do".to_string());
            info!(%reason, "sync plan requires no playback");
            self.status.send_replace(SessionStatus {
                completion_message: Some(reason.clone()),
                ..SessionStatus::idle()
            });
            let _ = self
                .event_bus
                .emit(CoreEvent::Engine(EngineEvent::Skipped { reason }));
            return Ok(None);
        }

        let session = PlaybackSession::new(track, mode, plan.iterations, plan.projected_final);
        let session_id = session.id;
        self.status
            .send_replace(SessionStatus::from_session(&session, None));

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let controller = IterationController::new(
            session,
            Arc::clone(&self.port),
            self.config.clone(),
            self.event_bus.clone(),
            self.status.clone(),
            cmd_rx,
            cancel.clone(),
        );

        *active = Some(ActiveSession {
            session_id,
            commands: cmd_tx,
            cancel,
        });
        drop(active);

        let slot = Arc::clone(&self.active);
        tokio::spawn(async move {
            controller.run().await;
            // Free the slot only if it still belongs to this session
            let mut active = slot.lock().await;
            if active.as_ref().map(|a| a.session_id) == Some(session_id) {
                *active = None;
            }
        });

        info!(%session_id, iterations = plan.iterations, "session spawned");
        Ok(Some(session_id))
    }

    /// Toggle the running session between playing and paused
    ///
    /// Ignored when no session is running; the controller itself ignores
    /// toggles outside the playing and paused states.
    pub async fn toggle_playback(&self) {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(active) => {
                debug!(session_id = %active.session_id, "toggle requested");
                let _ = active.commands.send(EngineCommand::TogglePlayback);
            }
            None => debug!("toggle ignored; no session running"),
        }
    }

    /// Stop the running session
    ///
    /// Idempotent: stopping with no session running, or stopping twice,
    /// does nothing.
    pub async fn stop(&self) {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(active) => {
                info!(session_id = %active.session_id, "stop requested");
                active.cancel.cancel();
            }
            None => debug!("stop ignored; no session running"),
        }
    }

    /// Whether a session is currently in flight
    pub async fn is_session_active(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Subscribe to status snapshots
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// The most recently published status snapshot
    pub fn current_status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }
}

// ============================================================================
// Tests
// ============================================================================
