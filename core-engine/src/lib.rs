//! # Play-Count Synchronization Engine
//!
//! Drives repeated truncated playback of a track so the host platform's
//! play counter reaches a desired value.
//!
//! ## Overview
//!
//! The host platform only credits a play after a track has audibly played
//! for a minimum span. This crate plans how many plays are needed, seeks
//! each play as close to the end of the track as that span allows, and
//! reconciles the player's own end-of-track reporting with a fallback
//! timer so every iteration is counted exactly once.
//!
//! ## Components
//!
//! - **Iteration Planner** (`planner`): Turns count snapshots and a sync mode into a fixed plan
//! - **Seek Strategy** (`seek`): Picks the per-iteration seek offset
//! - **Session State Machine** (`session`): Validated lifecycle for a session
//! - **Iteration Controller** (`controller`): Runs a session on its own task
//! - **Sync Engine** (`engine`): The facade hosts interact with

pub mod controller;
pub mod engine;
pub mod error;
pub mod planner;
pub mod seek;
pub mod session;

pub use controller::EngineCommand;
pub use engine::{EngineConfig, SessionStatus, SyncEngine};
pub use error::{EngineError, Result};
pub use planner::{plan, IterationPlan, SyncMode};
pub use seek::compute_seek_time;
pub use session::{PlaybackSession, RunState, SessionId, Track};
