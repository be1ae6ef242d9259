//! # Event Bus System
//!
//! Provides an event-driven architecture for the play-count sync core using
//! `tokio::sync::broadcast`. This module enables decoupled communication
//! between the engine and its observers (UI layers, logging) through typed
//! events.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for different domains
//! - **EventBus**: Central broadcast channel for publishing events
//! - **Subscription Management**: Multiple subscribers can listen independently
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, EngineEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! let event = CoreEvent::Engine(EngineEvent::IterationCompleted {
//!     session_id: "session-123".to_string(),
//!     iteration: 3,
//!     total_iterations: 20,
//! });
//! event_bus.emit(event).ok();
//! ```
//!
//! ## Error Handling
//!
//! The event bus uses `tokio::sync::broadcast`, which can produce two types
//! of errors on the receiving side:
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n`
//!   events. This is non-fatal; the subscriber can continue receiving new
//!   events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates
//!   shutdown.
//!
//! Subscribers should handle `Lagged` gracefully and treat `Closed` as a
//! signal to exit.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// This value balances memory usage with the ability to handle bursts of
/// events. Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
///
/// This is the main event type published and received through the event bus.
/// It wraps domain-specific event types for different modules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Session-level engine events
    Engine(EngineEvent),
    /// Player-level playback events
    Playback(PlaybackEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Engine(e) => e.description(),
            CoreEvent::Playback(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Engine(EngineEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Engine(EngineEvent::Started { .. }) => EventSeverity::Info,
            CoreEvent::Engine(EngineEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Engine(EngineEvent::Stopped { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Engine Events
// ============================================================================

/// Events describing the lifecycle of a play-count sync session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum EngineEvent {
    /// A sync session was created and began driving iterations.
    Started {
        /// Unique identifier for this session.
        session_id: String,
        /// The track being replayed.
        track_id: String,
        /// Track title.
        title: String,
        /// Number of truncated plays the session will perform.
        total_iterations: u32,
        /// Projected play count once all iterations complete.
        projected_final: u32,
    },
    /// The requested plan required no playback; no session was created.
    Skipped {
        /// Why the plan was a no-op.
        reason: String,
    },
    /// One truncated play was accounted for.
    IterationCompleted {
        /// The session ID.
        session_id: String,
        /// Iterations completed so far (1-based once the first play lands).
        iteration: u32,
        /// Total iterations the session will perform.
        total_iterations: u32,
    },
    /// The user paused the session mid-iteration.
    Paused {
        /// The session ID.
        session_id: String,
        /// The iteration in flight, 1-based.
        iteration: u32,
    },
    /// The user resumed a paused session.
    Resumed {
        /// The session ID.
        session_id: String,
        /// The iteration in flight, 1-based.
        iteration: u32,
    },
    /// All iterations finished.
    Completed {
        /// The session ID.
        session_id: String,
        /// Iterations performed.
        iterations: u32,
        /// The play count the target track should now report.
        final_count: u32,
    },
    /// The session was stopped by the user before finishing.
    Stopped {
        /// The session ID.
        session_id: String,
        /// Fully completed iterations at the time of the stop.
        iterations_completed: u32,
    },
    /// The session failed and will not be retried automatically.
    Failed {
        /// The session ID.
        session_id: String,
        /// Human-readable failure message.
        message: String,
        /// Fully completed iterations before the failure.
        iterations_completed: u32,
    },
}

impl EngineEvent {
    fn description(&self) -> &str {
        match self {
            EngineEvent::Started { .. } => "Sync session started",
            EngineEvent::Skipped { .. } => "Sync plan required no playback",
            EngineEvent::IterationCompleted { .. } => "Iteration completed",
            EngineEvent::Paused { .. } => "Session paused",
            EngineEvent::Resumed { .. } => "Session resumed",
            EngineEvent::Completed { .. } => "Sync session completed",
            EngineEvent::Stopped { .. } => "Sync session stopped by user",
            EngineEvent::Failed { .. } => "Sync session failed",
        }
    }
}

// ============================================================================
// Playback Events
// ============================================================================

/// Events mirroring player-level transitions while the engine drives it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// The engine is loading and buffering the track.
    Preparing {
        /// The track ID being prepared.
        track_id: String,
    },
    /// Truncated playback started.
    Started {
        /// The track ID being played.
        track_id: String,
        /// Track title.
        title: String,
    },
    /// Playback paused.
    Paused {
        /// The track ID.
        track_id: String,
    },
    /// Playback resumed after pause.
    Resumed {
        /// The track ID.
        track_id: String,
    },
    /// Playback stopped.
    Stopped {
        /// The track ID.
        track_id: String,
    },
    /// Playback error occurred.
    Error {
        /// The track ID if available.
        track_id: Option<String>,
        /// Human-readable error message.
        message: String,
        /// Whether a fresh session may succeed.
        recoverable: bool,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::Preparing { .. } => "Preparing playback",
            PlaybackEvent::Started { .. } => "Playback started",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::Resumed { .. } => "Playback resumed",
            PlaybackEvent::Stopped { .. } => "Playback stopped",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, CoreEvent, EngineEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut subscriber = event_bus.subscribe();
///
/// let event = CoreEvent::Engine(EngineEvent::Skipped {
///     reason: "source has no plays to add".to_string(),
/// });
/// event_bus.emit(event).ok();
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all
    /// future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
