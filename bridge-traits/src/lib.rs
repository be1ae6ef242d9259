//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host player
//! backend.
//!
//! ## Overview
//!
//! This crate defines the contract between the play-count sync engine and
//! the media player it drives. The engine never talks to a concrete player;
//! it consumes a [`PlaybackPort`](playback::PlaybackPort) injected at
//! construction time, which keeps the core deterministic and testable.
//!
//! ## Traits
//!
//! - [`PlaybackPort`](playback::PlaybackPort) - Load, prepare, seek, and
//!   control a single track; observe playback-state changes as a stream.
//!
//! ## Fail-Fast Strategy
//!
//! The engine assumes exclusive use of the player while a session is active.
//! Implementations should surface player-level failures promptly through
//! [`BridgeError`](error::BridgeError) (from `prepare`) or a
//! [`PlayerStateEvent::Error`](playback::PlayerStateEvent) on the event
//! stream, rather than swallowing them; the engine treats both as terminal
//! for the running session.
//!
//! ## Thread Safety
//!
//! [`PlaybackPort`](playback::PlaybackPort) requires `Send + Sync` so a
//! single shared adapter can be driven from the engine's async task.

pub mod error;
pub mod playback;

pub use error::{BridgeError, Result};

// Re-export commonly used types
pub use playback::{PlaybackPort, PlaybackTarget, PlayerStateEvent};
