//! Simulated playback port driven by tokio timers.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    playback::{PlaybackPort, PlaybackTarget, PlayerStateEvent},
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Buffer size for the simulated player's event channel.
const EVENT_BUFFER_SIZE: usize = 16;

/// Simulated buffering latency applied by `prepare`.
const PREPARE_LATENCY: Duration = Duration::from_millis(5);

#[derive(Default)]
struct PlayerState {
    loaded: Option<PlaybackTarget>,
    /// Playback position accumulated while not playing.
    position: Duration,
    /// Set while playback is running.
    play_started: Option<Instant>,
    /// Timer task that fires when the track reaches its end.
    end_task: Option<JoinHandle<()>>,
    /// Error to return from the next `prepare` call, if configured.
    prepare_failure: Option<String>,
}

struct Inner {
    state: Mutex<PlayerState>,
    events: broadcast::Sender<PlayerStateEvent>,
}

impl Inner {
    fn emit(&self, event: PlayerStateEvent) {
        // No subscribers is fine; the engine may not have attached yet.
        self.events.send(event).ok();
    }
}

/// In-process player that plays a loaded track in virtual real time.
///
/// Playback advances with the tokio clock, so tests running under
/// `tokio::time::pause` observe fully deterministic behavior: the track
/// "ends" exactly `duration - position` after `play`, at which point the
/// player resets to the start and emits [`PlayerStateEvent::Stopped`].
pub struct SimulatedPlayer {
    inner: Arc<Inner>,
}

impl SimulatedPlayer {
    /// Create a new simulated player with nothing loaded.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(PlayerState::default()),
                events,
            }),
        }
    }

    /// Make the next `prepare` call fail with the given message.
    pub fn fail_next_prepare(&self, message: impl Into<String>) {
        let mut state = self.inner.state.lock().unwrap();
        state.prepare_failure = Some(message.into());
    }

    /// Current playback position, including time accrued while playing.
    pub fn position(&self) -> Duration {
        let state = self.inner.state.lock().unwrap();
        match state.play_started {
            Some(started) => state.position + started.elapsed(),
            None => state.position,
        }
    }

    /// Whether playback is currently running.
    pub fn is_playing(&self) -> bool {
        self.inner.state.lock().unwrap().play_started.is_some()
    }

    /// Halt playback, remember the position, and return any timer task.
    ///
    /// The caller aborts the task outside the lock.
    fn halt(state: &mut PlayerState) -> Option<JoinHandle<()>> {
        if let Some(started) = state.play_started.take() {
            state.position += started.elapsed();
        }
        state.end_task.take()
    }

    fn spawn_end_task(inner: &Arc<Inner>, remaining: Duration) -> JoinHandle<()> {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            {
                let mut state = inner.state.lock().unwrap();
                state.play_started = None;
                state.position = Duration::ZERO;
                state.end_task = None;
            }
            debug!("simulated track reached its end");
            inner.emit(PlayerStateEvent::Stopped);
        })
    }
}

impl Default for SimulatedPlayer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlaybackPort for SimulatedPlayer {
    fn load_single_track(&self, target: PlaybackTarget) {
        let task = {
            let mut state = self.inner.state.lock().unwrap();
            let task = Self::halt(&mut state);
            debug!(track_id = %target.track_id, "loaded track into simulated player");
            state.loaded = Some(target);
            state.position = Duration::ZERO;
            task
        };
        if let Some(task) = task {
            task.abort();
        }
    }

    async fn prepare(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if let Some(message) = state.prepare_failure.take() {
                return Err(BridgeError::OperationFailed(message));
            }
            if state.loaded.is_none() {
                return Err(BridgeError::NotAvailable("no track loaded".to_string()));
            }
        }
        tokio::time::sleep(PREPARE_LATENCY).await;
        Ok(())
    }

    fn seek(&self, position: Duration) {
        let mut state = self.inner.state.lock().unwrap();
        if state.play_started.is_some() {
            // The engine only seeks before play; ignore seeks mid-flight.
            return;
        }
        let duration = state
            .loaded
            .as_ref()
            .map(|t| t.duration)
            .unwrap_or(Duration::ZERO);
        state.position = position.min(duration);
    }

    fn play(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.play_started.is_some() {
                return;
            }
            let Some(target) = state.loaded.as_ref() else {
                return;
            };
            let remaining = target.duration.saturating_sub(state.position);
            state.play_started = Some(Instant::now());
            state.end_task = Some(Self::spawn_end_task(&self.inner, remaining));
        }
        self.inner.emit(PlayerStateEvent::Playing);
    }

    fn pause(&self) {
        let task = {
            let mut state = self.inner.state.lock().unwrap();
            if state.play_started.is_none() {
                return;
            }
            Self::halt(&mut state)
        };
        if let Some(task) = task {
            task.abort();
        }
        self.inner.emit(PlayerStateEvent::Paused);
    }

    fn stop(&self) {
        let task = {
            let mut state = self.inner.state.lock().unwrap();
            let task = Self::halt(&mut state);
            state.position = Duration::ZERO;
            task
        };
        if let Some(task) = task {
            task.abort();
        }
        self.inner.emit(PlayerStateEvent::Stopped);
    }

    fn subscribe(&self) -> broadcast::Receiver<PlayerStateEvent> {
        self.inner.events.subscribe()
    }
}
