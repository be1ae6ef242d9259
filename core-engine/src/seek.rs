//! # Seek Strategy
//!
//! Picks the position to seek to before each playback iteration so the
//! player only needs to run for the minimum span the platform requires
//! before it credits a play.
//!
//! The chosen offset is `max(duration - min_play, duration * 0.8)`: short
//! tracks keep at least their final fifth, long tracks keep exactly the
//! qualifying span.

use crate::{EngineError, Result};

/// Fraction of the track always left unskipped, regardless of duration.
const RETAINED_FRACTION: f64 = 0.8;

/// Compute the seek offset in seconds for a track of the given duration.
///
/// # Errors
///
/// Returns [`EngineError::InvalidDuration`] when the duration is zero or
/// negative.
pub fn compute_seek_time(duration_secs: f64, min_play_duration_secs: f64) -> Result<f64> {
    if !(duration_secs > 0.0) {
        return Err(EngineError::InvalidDuration { duration_secs });
    }

    let by_min_play = duration_secs - min_play_duration_secs;
    let by_fraction = duration_secs * RETAINED_FRACTION;
    Ok(by_min_play.max(by_fraction))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_track_keeps_qualifying_span() {
        // 300s track: 300 - 32 = 268 beats 300 * 0.8 = 240
        let seek = compute_seek_time(300.0, 32.0).unwrap();
        assert_eq!(seek, 268.0);
    }

    #[test]
    fn test_short_track_keeps_final_fifth() {
        // 20s track: 20 * 0.8 = 16 beats 20 - 32 = -12
        let seek = compute_seek_time(20.0, 32.0).unwrap();
        assert_eq!(seek, 16.0);
    }

    #[test]
    fn test_crossover_point() {
        // At duration = min_play / 0.2 both rules agree
        let seek = compute_seek_time(160.0, 32.0).unwrap();
        assert_eq!(seek, 128.0);
    }

    #[test]
    fn test_zero_duration_rejected() {
        assert!(matches!(
            compute_seek_time(0.0, 32.0),
            Err(EngineError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn test_negative_duration_rejected() {
        assert!(compute_seek_time(-4.2, 32.0).is_err());
    }

    #[test]
    fn test_nan_duration_rejected() {
        assert!(compute_seek_time(f64::NAN, 32.0).is_err());
    }
}
