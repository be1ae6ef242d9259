//! End-to-end session tests driving the engine through a controllable
//! playback port and through the simulated player.
//!
//! All tests run with the tokio clock paused so the 32-second playback
//! spans and settle gaps elapse in virtual time.

use bridge_sim::SimulatedPlayer;
use bridge_traits::{BridgeError, PlaybackPort, PlaybackTarget, PlayerStateEvent};
use core_engine::{EngineConfig, EngineError, RunState, SessionStatus, SyncEngine, SyncMode, Track};
use core_runtime::events::{CoreEvent, EngineEvent, EventBus};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

// ============================================================================
// Test Harness
// ============================================================================

/// How the test port answers `prepare`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrepareBehavior {
    /// Resolve immediately
    Ready,
    /// Fail with a fixed error
    Fail,
    /// Never resolve
    Stall,
}

/// A playback port the test script drives by hand
struct ManualPort {
    events: broadcast::Sender<PlayerStateEvent>,
    prepare: PrepareBehavior,
    calls: Mutex<Vec<&'static str>>,
}

impl ManualPort {
    fn new(prepare: PrepareBehavior) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            events,
            prepare,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn saw_call(&self, call: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| *c == call)
    }

    fn send(&self, event: PlayerStateEvent) {
        // Nobody subscribed yet is fine for tests that race stop
        let _ = self.events.send(event);
    }
}

#[async_trait::async_trait]
impl PlaybackPort for ManualPort {
    fn load_single_track(&self, _target: PlaybackTarget) {
        self.record("load");
    }

    async fn prepare(&self) -> bridge_traits::Result<()> {
        match self.prepare {
            PrepareBehavior::Ready => Ok(()),
            PrepareBehavior::Fail => Err(BridgeError::OperationFailed(
                "no route to player".to_string(),
            )),
            PrepareBehavior::Stall => std::future::pending().await,
        }
    }

    fn seek(&self, _position: Duration) {
        self.record("seek");
    }

    fn play(&self) {
        self.record("play");
    }

    fn pause(&self) {
        self.record("pause");
    }

    fn stop(&self) {
        self.record("stop");
    }

    fn subscribe(&self) -> broadcast::Receiver<PlayerStateEvent> {
        self.events.subscribe()
    }
}

fn track() -> Track {
    // 300s track: seek lands at 268, leaving a 32s tail
    Track::new("track-1", "Evening Song", "Test Artist", 300.0, 0)
}

fn engine_over(port: Arc<dyn PlaybackPort>) -> SyncEngine {
    SyncEngine::new(EngineConfig::default(), port, EventBus::new(64))
        .expect("default config is valid")
}

async fn wait_state(
    status: &mut watch::Receiver<SessionStatus>,
    what: &str,
    predicate: impl FnMut(&SessionStatus) -> bool,
) -> SessionStatus {
    tokio::time::timeout(Duration::from_secs(3_600), status.wait_for(predicate))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .expect("status channel closed")
        .clone()
}

async fn wait_terminal(status: &mut watch::Receiver<SessionStatus>) -> SessionStatus {
    wait_state(status, "a terminal state", |s| s.run_state.is_terminal()).await
}

/// Let the controller task observe anything we just sent it
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ============================================================================
// Happy Path
// ============================================================================

#[tokio::test(start_paused = true)]
async fn completes_all_iterations_with_simulated_player() {
    let player = Arc::new(SimulatedPlayer::new());
    let bus = EventBus::new(64);
    let mut events = bus.subscribe();
    let engine = SyncEngine::new(EngineConfig::default(), player, bus).unwrap();
    let mut status = engine.subscribe_status();

    // Add 3 plays on top of 5 existing ones
    let session_id = engine
        .start(track(), SyncMode::Add, 3, 5)
        .await
        .unwrap()
        .expect("plan requires playback");

    let last = wait_terminal(&mut status).await;
    assert_eq!(last.run_state, RunState::Completed);
    assert_eq!(last.session_id, Some(session_id));
    assert_eq!(last.current_iteration, 3);
    assert_eq!(last.total_iterations, 3);
    assert!(!last.is_processing);
    let message = last.completion_message.expect("terminal message published");
    assert!(message.contains('8'), "{message}");

    // The bus saw the full engine lifecycle in order
    let mut engine_events = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Engine(e) = event {
            engine_events.push(e);
        }
    }
    assert!(matches!(engine_events.first(), Some(EngineEvent::Started { total_iterations: 3, projected_final: 8, .. })));
    let completed_iterations: Vec<u32> = engine_events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::IterationCompleted { iteration, .. } => Some(*iteration),
            _ => None,
        })
        .collect();
    assert_eq!(completed_iterations, vec![1, 2, 3]);
    assert!(matches!(engine_events.last(), Some(EngineEvent::Completed { iterations: 3, final_count: 8, .. })));
}

#[tokio::test(start_paused = true)]
async fn fallback_timer_completes_silent_iteration() {
    // This port never reports the track end; only the timer can finish it
    let port = ManualPort::new(PrepareBehavior::Ready);
    let engine = engine_over(port.clone());
    let mut status = engine.subscribe_status();

    engine
        .start(track(), SyncMode::Add, 1, 0)
        .await
        .unwrap()
        .expect("plan requires playback");

    let last = wait_terminal(&mut status).await;
    assert_eq!(last.run_state, RunState::Completed);
    assert_eq!(last.current_iteration, 1);
    assert!(port.saw_call("seek"));
    assert!(port.saw_call("stop"));
}

// ============================================================================
// Completion Reconciliation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn duplicate_track_end_signals_account_once() {
    let port = ManualPort::new(PrepareBehavior::Ready);
    let engine = engine_over(port.clone());
    let mut status = engine.subscribe_status();

    engine
        .start(track(), SyncMode::Add, 2, 0)
        .await
        .unwrap()
        .expect("plan requires playback");
    wait_state(&mut status, "playback", |s| s.is_playing).await;

    // The player reports the same track end twice
    port.send(PlayerStateEvent::Stopped);
    port.send(PlayerStateEvent::Stopped);

    let mid = wait_state(&mut status, "first iteration", |s| s.current_iteration == 1).await;
    assert!(
        mid.run_state.is_active(),
        "one signal accounts one iteration, not the whole session"
    );

    // The second iteration sees neither stale signal and finishes on its timer
    let last = wait_terminal(&mut status).await;
    assert_eq!(last.run_state, RunState::Completed);
    assert_eq!(last.current_iteration, 2);
}

#[tokio::test(start_paused = true)]
async fn pause_near_track_end_counts_as_completion() {
    let port = ManualPort::new(PrepareBehavior::Ready);
    let engine = engine_over(port.clone());
    let mut status = engine.subscribe_status();

    engine
        .start(track(), SyncMode::Add, 1, 0)
        .await
        .unwrap()
        .expect("plan requires playback");
    wait_state(&mut status, "playback", |s| s.is_playing).await;

    // A pause far from the end is noise
    tokio::time::sleep(Duration::from_secs(5)).await;
    port.send(PlayerStateEvent::Paused);
    settle().await;
    let current = engine.current_status();
    assert!(current.is_playing);
    assert_eq!(current.current_iteration, 0);

    // One second before the end of the tail it means the track finished
    tokio::time::sleep(Duration::from_secs(26)).await;
    port.send(PlayerStateEvent::Paused);

    let last = wait_terminal(&mut status).await;
    assert_eq!(last.run_state, RunState::Completed);
    assert_eq!(last.current_iteration, 1);
}

// ============================================================================
// Pause / Resume
// ============================================================================

#[tokio::test(start_paused = true)]
async fn pause_and_resume_rearms_remaining_time() {
    let port = ManualPort::new(PrepareBehavior::Ready);
    let engine = engine_over(port.clone());
    let mut status = engine.subscribe_status();

    engine
        .start(track(), SyncMode::Add, 1, 0)
        .await
        .unwrap()
        .expect("plan requires playback");
    wait_state(&mut status, "playback", |s| s.is_playing).await;

    // Pause 10 seconds in
    tokio::time::sleep(Duration::from_secs(10)).await;
    engine.toggle_playback().await;
    wait_state(&mut status, "pause", |s| s.run_state == RunState::Paused).await;
    assert!(port.saw_call("pause"));

    // However long the pause lasts, no play time accrues
    tokio::time::sleep(Duration::from_secs(500)).await;
    assert_eq!(engine.current_status().run_state, RunState::Paused);
    assert_eq!(engine.current_status().current_iteration, 0);

    engine.toggle_playback().await;
    wait_state(&mut status, "resume", |s| s.run_state == RunState::Playing).await;

    // 22 seconds of play time are still owed; just before that the
    // iteration must not have been accounted
    tokio::time::sleep(Duration::from_secs(21)).await;
    assert_eq!(engine.current_status().current_iteration, 0);
    assert!(engine.current_status().is_playing);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let last = wait_terminal(&mut status).await;
    assert_eq!(last.run_state, RunState::Completed);
    assert_eq!(last.current_iteration, 1);
}

// ============================================================================
// Stop & Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn stop_during_stalled_prepare_is_safe() {
    let port = ManualPort::new(PrepareBehavior::Stall);
    let engine = engine_over(port.clone());
    let mut status = engine.subscribe_status();

    engine
        .start(track(), SyncMode::Add, 3, 0)
        .await
        .unwrap()
        .expect("plan requires playback");
    wait_state(&mut status, "preparation", |s| {
        s.run_state == RunState::Preparing
    })
    .await;

    engine.stop().await;

    let last = wait_terminal(&mut status).await;
    assert_eq!(last.run_state, RunState::Stopped);
    assert_eq!(last.current_iteration, 0, "no partial credit");
    assert!(port.saw_call("load"));
    assert!(!port.saw_call("play"), "playback never started");
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent() {
    let port = ManualPort::new(PrepareBehavior::Ready);
    let bus = EventBus::new(64);
    let mut events = bus.subscribe();
    let engine = SyncEngine::new(EngineConfig::default(), port, bus).unwrap();
    let mut status = engine.subscribe_status();

    engine
        .start(track(), SyncMode::Add, 5, 0)
        .await
        .unwrap()
        .expect("plan requires playback");
    wait_state(&mut status, "playback", |s| s.is_playing).await;

    engine.stop().await;
    let first = wait_terminal(&mut status).await;
    assert_eq!(first.run_state, RunState::Stopped);
    let message = first.completion_message.clone().expect("stop message");
    assert!(message.contains("0 of 5"), "{message}");

    engine.stop().await;
    settle().await;
    assert_eq!(engine.current_status(), first);

    let stop_events = {
        let mut count = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, CoreEvent::Engine(EngineEvent::Stopped { .. })) {
                count += 1;
            }
        }
        count
    };
    assert_eq!(stop_events, 1);
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected_while_running() {
    let port = ManualPort::new(PrepareBehavior::Ready);
    let engine = engine_over(port);
    let mut status = engine.subscribe_status();

    engine
        .start(track(), SyncMode::Add, 2, 0)
        .await
        .unwrap()
        .expect("plan requires playback");
    wait_state(&mut status, "playback", |s| s.is_playing).await;

    let second = engine.start(track(), SyncMode::Add, 2, 0).await;
    assert!(matches!(second, Err(EngineError::AlreadyRunning)));

    // The running session is untouched
    assert!(engine.current_status().is_processing);
    engine.stop().await;
    wait_terminal(&mut status).await;
}

// ============================================================================
// Planning Outcomes
// ============================================================================

#[tokio::test(start_paused = true)]
async fn noop_plan_publishes_message_without_session() {
    let port = ManualPort::new(PrepareBehavior::Ready);
    let engine = engine_over(port.clone());

    let outcome = engine.start(track(), SyncMode::Match, 10, 10).await.unwrap();
    assert!(outcome.is_none());

    let status = engine.current_status();
    assert!(!status.is_processing);
    assert!(status.session_id.is_none());
    assert_eq!(
        status.completion_message.as_deref(),
        Some("target already at or above source count")
    );
    assert!(!engine.is_session_active().await);
    assert!(!port.saw_call("load"), "no playback for a no-op plan");

    let outcome = engine.start(track(), SyncMode::Add, 0, 10).await.unwrap();
    assert!(outcome.is_none());
    assert_eq!(
        engine.current_status().completion_message.as_deref(),
        Some("source has no plays to add")
    );
}

#[tokio::test(start_paused = true)]
async fn invalid_track_duration_is_rejected() {
    let port = ManualPort::new(PrepareBehavior::Ready);
    let engine = engine_over(port);

    let bad = Track::new("track-2", "Broken", "Artist", 0.0, 3);
    let result = engine.start(bad, SyncMode::Add, 2, 0).await;
    assert!(matches!(
        result,
        Err(EngineError::InvalidDuration { .. })
    ));
    assert!(!engine.is_session_active().await);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn prepare_failure_fails_the_session() {
    let port = ManualPort::new(PrepareBehavior::Fail);
    let engine = engine_over(port);
    let mut status = engine.subscribe_status();

    engine
        .start(track(), SyncMode::Add, 2, 0)
        .await
        .unwrap()
        .expect("plan requires playback");

    let last = wait_terminal(&mut status).await;
    assert_eq!(last.run_state, RunState::Failed);
    assert_eq!(last.current_iteration, 0);
    let message = last.completion_message.expect("failure message");
    assert!(message.contains("no route to player"), "{message}");
}

#[tokio::test(start_paused = true)]
async fn player_error_event_fails_the_session() {
    let port = ManualPort::new(PrepareBehavior::Ready);
    let engine = engine_over(port.clone());
    let mut status = engine.subscribe_status();

    engine
        .start(track(), SyncMode::Add, 3, 0)
        .await
        .unwrap()
        .expect("plan requires playback");
    wait_state(&mut status, "playback", |s| s.is_playing).await;

    port.send(PlayerStateEvent::Error {
        message: "decoder died".to_string(),
    });

    let last = wait_terminal(&mut status).await;
    assert_eq!(last.run_state, RunState::Failed);
    assert_eq!(last.current_iteration, 0, "no partial credit");
    let message = last.completion_message.expect("failure message");
    assert!(message.contains("decoder died"), "{message}");
    assert!(port.saw_call("stop"), "player is stopped on the way out");
}

#[test]
fn zero_min_play_config_is_rejected() {
    let config = EngineConfig {
        min_play_duration_secs: 0,
        ..EngineConfig::default()
    };
    let port = ManualPort::new(PrepareBehavior::Ready);
    assert!(matches!(
        SyncEngine::new(config, port, EventBus::new(4)),
        Err(EngineError::InvalidConfig(_))
    ));
}
