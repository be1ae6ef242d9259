//! Playback bridge trait and supporting types.
//!
//! These abstractions allow the sync engine to drive a platform media player
//! without knowing which one the host wired in. Host applications are
//! expected to provide a concrete implementation per player backend (system
//! player, embedded player, simulator).

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;

/// Descriptor for the single track a playback port should queue up.
///
/// Carries just enough metadata for the host player to locate the item and
/// enrich its media session; the engine keeps its own richer track snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackTarget {
    /// Opaque stable identifier understood by the host player.
    pub track_id: String,
    /// Display title for the track.
    pub title: String,
    /// Display artist string.
    pub artist: String,
    /// Total track duration as reported by the host library.
    pub duration: Duration,
}

impl PlaybackTarget {
    /// Construct a new playback target.
    pub fn new(
        track_id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            track_id: track_id.into(),
            title: title.into(),
            artist: artist.into(),
            duration,
        }
    }
}

/// Player state change reported by the host player.
///
/// The engine treats these as the authoritative stream of playback-state
/// notifications; command echoes (a `Paused` following the engine's own
/// `pause()`) are expected and filtered by the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum PlayerStateEvent {
    /// Playback is running.
    Playing,
    /// Playback is paused.
    Paused,
    /// Playback stopped, either by command or because the track ended.
    Stopped,
    /// The player hit an unrecoverable error mid-playback.
    Error {
        /// Human-readable error message from the host player.
        message: String,
    },
}

/// Trait for platform-specific playback adapters that drive native players.
///
/// `prepare` is the only genuinely asynchronous operation (buffering,
/// authorization). The remaining controls are fire-and-forget commands whose
/// effects surface later on the event stream returned by [`subscribe`].
///
/// [`subscribe`]: PlaybackPort::subscribe
#[async_trait::async_trait]
pub trait PlaybackPort: Send + Sync {
    /// Replace the player queue with the single provided track.
    fn load_single_track(&self, target: PlaybackTarget);

    /// Buffer and authorize the loaded track so playback can begin.
    async fn prepare(&self) -> Result<()>;

    /// Seek to an absolute position within the loaded track.
    fn seek(&self, position: Duration);

    /// Begin or resume playback.
    fn play(&self);

    /// Pause playback without releasing the loaded track.
    fn pause(&self);

    /// Stop playback and reset to the start of the track.
    fn stop(&self);

    /// Subscribe to state-change events.
    ///
    /// Each call creates an independent receiver; only events emitted after
    /// the call are delivered.
    fn subscribe(&self) -> broadcast::Receiver<PlayerStateEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_target_new() {
        let target = PlaybackTarget::new("t-1", "Song", "Artist", Duration::from_secs(240));
        assert_eq!(target.track_id, "t-1");
        assert_eq!(target.duration, Duration::from_secs(240));
    }

    #[test]
    fn player_state_event_equality() {
        assert_eq!(PlayerStateEvent::Playing, PlayerStateEvent::Playing);
        assert_ne!(PlayerStateEvent::Playing, PlayerStateEvent::Stopped);
        assert_eq!(
            PlayerStateEvent::Error {
                message: "boom".to_string()
            },
            PlayerStateEvent::Error {
                message: "boom".to_string()
            }
        );
    }
}
