//! # Iteration Controller
//!
//! Drives a single play-count session through its planned iterations.
//!
//! ## Overview
//!
//! Each iteration seeks the player near the end of the track, lets it run
//! for the span the platform requires before crediting a play, and then
//! stops the player so the next iteration can start clean. Two independent
//! signals can end an iteration: the player reporting that the track
//! stopped, or a fallback timer armed for the qualifying span. Whichever
//! arrives first wins; the loser is discarded, so an iteration is never
//! accounted twice.
//!
//! The controller runs on its own task and is driven entirely through a
//! command channel and a cancellation token. All player interaction goes
//! through the [`PlaybackPort`] trait, and every observable change is
//! published on a `watch` channel and mirrored onto the event bus.

use crate::{
    engine::{EngineConfig, SessionStatus},
    seek,
    session::{PlaybackSession, RunState},
    EngineError,
};
use bridge_traits::{PlaybackPort, PlayerStateEvent};
use core_runtime::events::{CoreEvent, EngineEvent, EventBus, PlaybackEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// Commands
// ============================================================================

/// Commands the engine facade sends to a running controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    /// Toggle between playing and paused; ignored outside those states
    TogglePlayback,
}

/// How a single iteration ended
enum IterationOutcome {
    /// The iteration was accounted and the session sits in the settle gap
    Finished,
    /// The user stopped the session before the iteration qualified
    Stopped,
}

/// How the whole session ended, barring errors
enum DriveOutcome {
    Completed,
    Stopped,
}

// ============================================================================
// Iteration Controller
// ============================================================================

/// Runs one session to a terminal state on a dedicated task
pub struct IterationController {
    session: PlaybackSession,
    port: Arc<dyn PlaybackPort>,
    config: EngineConfig,
    event_bus: EventBus,
    status: watch::Sender<SessionStatus>,
    commands: mpsc::UnboundedReceiver<EngineCommand>,
    cancel: CancellationToken,
}

impl IterationController {
    pub fn new(
        session: PlaybackSession,
        port: Arc<dyn PlaybackPort>,
        config: EngineConfig,
        event_bus: EventBus,
        status: watch::Sender<SessionStatus>,
        commands: mpsc::UnboundedReceiver<EngineCommand>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            port,
            config,
            event_bus,
            status,
            commands,
            cancel,
        }
    }

    /// Drive the session to a terminal state
    #[instrument(skip(self), fields(session_id = %self.session.id, track_id = %self.session.track.id))]
    pub async fn run(mut self) {
        info!(
            mode = %self.session.mode,
            total_iterations = self.session.total_iterations,
            "play-count session started"
        );
        self.emit(CoreEvent::Engine(EngineEvent::Started {
            session_id: self.session.id.as_str(),
            track_id: self.session.track.id.clone(),
            title: self.session.track.title.clone(),
            total_iterations: self.session.total_iterations,
            projected_final: self.session.projected_final_count,
        }));

        match self.drive().await {
            Ok(DriveOutcome::Completed) => self.finish_completed(),
            Ok(DriveOutcome::Stopped) => self.finish_stopped(),
            Err(err) => self.finish_failed(err),
        }
    }

    async fn drive(&mut self) -> Result<DriveOutcome, EngineError> {
        while self.session.remaining_iterations() > 0 {
            match self.run_iteration().await? {
                IterationOutcome::Finished => {}
                IterationOutcome::Stopped => return Ok(DriveOutcome::Stopped),
            }

            // No settle gap after the final iteration
            if self.session.remaining_iterations() > 0 && !self.settle_gap().await {
                return Ok(DriveOutcome::Stopped);
            }
        }
        Ok(DriveOutcome::Completed)
    }

    /// Run one truncated play from preparation through accounting
    async fn run_iteration(&mut self) -> Result<IterationOutcome, EngineError> {
        let iteration = self.session.current_iteration + 1;
        self.session.begin_preparing()?;
        self.publish_status();
        self.emit(CoreEvent::Playback(PlaybackEvent::Preparing {
            track_id: self.session.track.id.clone(),
        }));
        debug!(iteration, "preparing iteration");

        let seek_secs = seek::compute_seek_time(
            self.session.track.duration_secs,
            self.config.min_play_duration_secs as f64,
        )?;

        self.port.load_single_track(self.session.track.playback_target());

        tokio::select! {
            _ = self.cancel.cancelled() => return Ok(IterationOutcome::Stopped),
            result = self.port.prepare() => {
                result.map_err(|e| EngineError::PrepareFailed(e.to_string()))?;
            }
        }

        // Toggles queued while nothing was playing are meaningless
        while self.commands.try_recv().is_ok() {}

        // A fresh subscription per iteration; stale player events from a
        // previous iteration (including echoes of our own stop) must never
        // be able to account this one.
        let mut player_events = self.port.subscribe();

        self.port.seek(Duration::from_secs_f64(seek_secs));
        self.port.play();
        self.session.begin_playing()?;
        self.publish_status();
        self.emit(CoreEvent::Playback(PlaybackEvent::Started {
            track_id: self.session.track.id.clone(),
            title: self.session.track.title.clone(),
        }));
        debug!(iteration, seek_secs, "iteration playing");

        let min_play = Duration::from_secs(self.config.min_play_duration_secs);
        let pause_window = Duration::from_secs(self.config.natural_pause_window_secs);
        let resume_epsilon = Duration::from_millis(self.config.resume_epsilon_ms);
        // Audible span from the seek point to the end of the track
        let tail = Duration::from_secs_f64(
            (self.session.track.duration_secs - seek_secs).max(0.0),
        );

        // Play time accumulated over completed segments; the running
        // segment is measured from `segment_started`.
        let mut played = Duration::ZERO;
        let mut segment_started = Instant::now();
        // Armed only while playing; cleared on pause
        let mut deadline: Option<Instant> = Some(segment_started + min_play);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.port.stop();
                    return Ok(IterationOutcome::Stopped);
                }

                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    // Fallback: the qualifying span elapsed without the
                    // player ever telling us the track ended.
                    debug!(iteration, "fallback timer elapsed");
                    break;
                }

                command = self.commands.recv() => match command {
                    Some(EngineCommand::TogglePlayback) => {
                        if self.session.run_state == RunState::Playing {
                            played += segment_started.elapsed();
                            deadline = None;
                            self.port.pause();
                            self.session.pause()?;
                            self.publish_status();
                            self.emit(CoreEvent::Engine(EngineEvent::Paused {
                                session_id: self.session.id.as_str(),
                                iteration,
                            }));
                            self.emit(CoreEvent::Playback(PlaybackEvent::Paused {
                                track_id: self.session.track.id.clone(),
                            }));
                            debug!(iteration, played_ms = played.as_millis() as u64, "paused");
                        } else {
                            // Re-arm for the play time still owed, with a
                            // small floor so resuming at the boundary still
                            // schedules a wake-up.
                            let remaining = min_play.saturating_sub(played).max(resume_epsilon);
                            segment_started = Instant::now();
                            deadline = Some(segment_started + remaining);
                            self.port.play();
                            self.session.begin_playing()?;
                            self.publish_status();
                            self.emit(CoreEvent::Engine(EngineEvent::Resumed {
                                session_id: self.session.id.as_str(),
                                iteration,
                            }));
                            self.emit(CoreEvent::Playback(PlaybackEvent::Resumed {
                                track_id: self.session.track.id.clone(),
                            }));
                            debug!(iteration, remaining_ms = remaining.as_millis() as u64, "resumed");
                        }
                    }
                    // The facade is gone; wind the session down
                    None => {
                        self.port.stop();
                        return Ok(IterationOutcome::Stopped);
                    }
                },

                event = player_events.recv() => match event {
                    Ok(PlayerStateEvent::Stopped) if self.session.run_state == RunState::Playing => {
                        debug!(iteration, "player reported track end");
                        break;
                    }
                    Ok(PlayerStateEvent::Paused) if self.session.run_state == RunState::Playing => {
                        // Some players report track completion as a pause at
                        // the end of the stream. Only honor it when the
                        // playhead is close enough to the end; anything
                        // earlier is noise we did not request.
                        let position = played + segment_started.elapsed();
                        if tail.saturating_sub(position) <= pause_window {
                            debug!(iteration, "player paused at end of track");
                            break;
                        }
                        debug!(iteration, "ignoring unsolicited pause mid-track");
                    }
                    Ok(PlayerStateEvent::Error { message }) => {
                        return Err(EngineError::PlaybackFailed(message));
                    }
                    // Our own command echoes and anything else
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(iteration, missed, "player event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(EngineError::PlaybackFailed(
                            "player event stream closed".to_string(),
                        ));
                    }
                },
            }
        }

        // Exactly one of the racing completion signals reaches this point.
        self.port.stop();
        self.session.finish_iteration()?;
        self.publish_status();
        self.emit(CoreEvent::Engine(EngineEvent::IterationCompleted {
            session_id: self.session.id.as_str(),
            iteration: self.session.current_iteration,
            total_iterations: self.session.total_iterations,
        }));
        info!(
            iteration = self.session.current_iteration,
            total = self.session.total_iterations,
            "iteration accounted"
        );
        Ok(IterationOutcome::Finished)
    }

    /// Wait out the settle gap between iterations
    ///
    /// Returns `false` when the session was stopped during the gap.
    async fn settle_gap(&mut self) -> bool {
        let sleep = tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms));
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(EngineCommand::TogglePlayback) => {
                        debug!("ignoring toggle during settle gap");
                    }
                    None => return false,
                },
            }
        }
    }

    fn finish_completed(&mut self) {
        if let Err(err) = self.session.complete() {
            // Unreachable by construction; surface it rather than lie
            error!(error = %err, "session completion was not legal");
            self.finish_failed(err);
            return;
        }
        let message = format!(
            "Done: \"{}\" should now show {} plays",
            self.session.track.title, self.session.projected_final_count
        );
        info!(
            iterations = self.session.total_iterations,
            projected_final = self.session.projected_final_count,
            "play-count session completed"
        );
        self.publish_terminal(message);
        self.emit(CoreEvent::Engine(EngineEvent::Completed {
            session_id: self.session.id.as_str(),
            iterations: self.session.total_iterations,
            final_count: self.session.projected_final_count,
        }));
    }

    fn finish_stopped(&mut self) {
        if self.session.run_state.is_terminal() {
            return;
        }
        if self.session.stop().is_err() {
            return;
        }
        let message = format!(
            "Stopped after {} of {} plays",
            self.session.current_iteration, self.session.total_iterations
        );
        info!(
            iterations_completed = self.session.current_iteration,
            "play-count session stopped"
        );
        self.publish_terminal(message);
        self.emit(CoreEvent::Engine(EngineEvent::Stopped {
            session_id: self.session.id.as_str(),
            iterations_completed: self.session.current_iteration,
        }));
    }

    fn finish_failed(&mut self, err: EngineError) {
        // Never leave the player running on the way out
        self.port.stop();
        if self.session.run_state.is_terminal() {
            return;
        }
        let player_fault = matches!(
            err,
            EngineError::PrepareFailed(_) | EngineError::PlaybackFailed(_)
        );
        let message = err.to_string();
        if self.session.fail(message.clone()).is_err() {
            return;
        }
        error!(error = %message, "play-count session failed");
        self.publish_terminal(format!("Play-count sync failed: {message}"));
        if player_fault {
            self.emit(CoreEvent::Playback(PlaybackEvent::Error {
                track_id: Some(self.session.track.id.clone()),
                message: message.clone(),
                recoverable: true,
            }));
        }
        self.emit(CoreEvent::Engine(EngineEvent::Failed {
            session_id: self.session.id.as_str(),
            message,
            iterations_completed: self.session.current_iteration,
        }));
    }

    /// Publish the current session state on the watch channel
    fn publish_status(&self) {
        self.status.send_replace(SessionStatus::from_session(&self.session, None));
    }

    /// Publish a terminal state along with its user-facing message
    fn publish_terminal(&self, message: String) {
        self.status
            .send_replace(SessionStatus::from_session(&self.session, Some(message)));
    }

    fn emit(&self, event: CoreEvent) {
        // Nobody listening is fine
        let _ = self.event_bus.emit(event);
    }
}

// ============================================================================
// Tests
// ============================================================================
