//! # Iteration Planner
//!
//! Computes how many playback iterations are needed to bring a track's
//! play count on the host platform to the desired value.
//!
//! ## Overview
//!
//! A plan is a pure function of the sync mode and the two count snapshots
//! taken when the user initiates a sync. `Match` plays the difference so
//! the target catches up to the source; `Add` plays the source count on
//! top of whatever the target already has. Counts are never re-read while
//! a session runs, so a plan is fixed for the lifetime of a session.

use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Sync Mode
// ============================================================================

/// How the source play count is applied to the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Bring the target count up to the source count
    Match,
    /// Add the source count on top of the target count
    Add,
}

impl SyncMode {
    /// Get the string representation of this mode
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Match => "match",
            SyncMode::Add => "add",
        }
    }
}

impl FromStr for SyncMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "match" => Ok(SyncMode::Match),
            "add" => Ok(SyncMode::Add),
            _ => Err(EngineError::InvalidSyncMode(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Iteration Plan
// ============================================================================

/// The outcome of planning a sync session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationPlan {
    /// Number of playback iterations to run
    pub iterations: u32,
    /// Play count the target is expected to show once all iterations finish
    pub projected_final: u32,
    /// Human-readable reason when no playback is required
    pub noop_reason: Option<String>,
}

impl IterationPlan {
    /// Check whether this plan requires any playback at all
    pub fn is_noop(&self) -> bool {
        self.iterations == 0
    }
}

/// Compute the iteration plan for the given mode and count snapshots
pub fn plan(mode: SyncMode, source_count: u32, target_count: u32) -> IterationPlan {
    match mode {
        SyncMode::Match => {
            if source_count <= target_count {
                IterationPlan {
                    iterations: 0,
                    projected_final: target_count,
                    noop_reason: Some(
                        "target already at or above source count".to_string(),
                    ),
                }
            } else {
                IterationPlan {
                    iterations: source_count - target_count,
                    projected_final: source_count,
                    noop_reason: None,
                }
            }
        }
        SyncMode::Add => {
            if source_count == 0 {
                IterationPlan {
                    iterations: 0,
                    projected_final: target_count,
                    noop_reason: Some("source has no plays to add".to_string()),
                }
            } else {
                IterationPlan {
                    iterations: source_count,
                    projected_final: target_count.saturating_add(source_count),
                    noop_reason: None,
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_mode_parsing() {
        assert_eq!("match".parse::<SyncMode>().unwrap(), SyncMode::Match);
        assert_eq!("ADD".parse::<SyncMode>().unwrap(), SyncMode::Add);
        assert!("invalid".parse::<SyncMode>().is_err());
    }

    #[test]
    fn test_match_plays_the_difference() {
        let plan = plan(SyncMode::Match, 50, 30);
        assert_eq!(plan.iterations, 20);
        assert_eq!(plan.projected_final, 50);
        assert!(plan.noop_reason.is_none());
    }

    #[test]
    fn test_match_equal_counts_is_noop() {
        let plan = plan(SyncMode::Match, 10, 10);
        assert!(plan.is_noop());
        assert_eq!(plan.projected_final, 10);
        assert_eq!(
            plan.noop_reason.as_deref(),
            Some("target already at or above source count")
        );
    }

    #[test]
    fn test_match_target_ahead_is_noop() {
        let plan = plan(SyncMode::Match, 5, 12);
        assert!(plan.is_noop());
        assert_eq!(plan.projected_final, 12);
    }

    #[test]
    fn test_add_plays_source_count() {
        let plan = plan(SyncMode::Add, 7, 5);
        assert_eq!(plan.iterations, 7);
        assert_eq!(plan.projected_final, 12);
        assert!(plan.noop_reason.is_none());
    }

    #[test]
    fn test_add_zero_source_is_noop() {
        let plan = plan(SyncMode::Add, 0, 42);
        assert!(plan.is_noop());
        assert_eq!(plan.projected_final, 42);
        assert_eq!(plan.noop_reason.as_deref(), Some("source has no plays to add"));
    }

    #[test]
    fn test_add_saturates_projection() {
        let plan = plan(SyncMode::Add, 10, u32::MAX - 3);
        assert_eq!(plan.iterations, 10);
        assert_eq!(plan.projected_final, u32::MAX);
    }
}
