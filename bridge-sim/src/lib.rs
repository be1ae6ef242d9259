//! # Simulated Player Bridge
//!
//! A timer-driven implementation of the playback bridge for tests and
//! dry runs.
//!
//! ## Overview
//!
//! This crate provides [`SimulatedPlayer`], an in-process implementation of
//! `bridge_traits::PlaybackPort` that "plays" a loaded track in virtual real
//! time using tokio timers. It emits the same `Playing`/`Paused`/`Stopped`
//! state events a host player would, which makes it suitable for:
//! - Engine integration tests under `tokio::time::pause` (deterministic)
//! - Host applications offering a dry-run mode that exercises a full
//!   sync session without touching a real player
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_sim::SimulatedPlayer;
//! use bridge_traits::{PlaybackPort, PlaybackTarget};
//! use std::time::Duration;
//!
//! let player = SimulatedPlayer::new();
//! player.load_single_track(PlaybackTarget::new(
//!     "track-1", "Song", "Artist", Duration::from_secs(240),
//! ));
//! ```

mod player;

pub use player::SimulatedPlayer;
