//! Pairwise fix comparison.
//!
//! Timeliness first (two-minute window), then accuracy, then provider identity.
//! The relation is not transitive; use it to decide between two readings only,
//! never as a sort key.

use super::types::Position;

/// Fixes further apart than this are decided on age alone.
pub const TWO_MINUTES_MS: i64 = 2 * 60 * 1000;

/// A newer fix from the same provider may lose up to this much accuracy and still win.
pub const SIGNIFICANT_ACCURACY_LOSS_M: f64 = 200.0;

/// Decide whether `candidate` should replace `incumbent`. Returns the winner.
pub fn pick_better<'a>(candidate: &'a Position, incumbent: Option<&'a Position>) -> &'a Position {
    let incumbent = match incumbent {
        Some(p) => p,
        None => return candidate, // anything beats nothing
    };

    let time_delta = candidate.timestamp.saturating_sub(incumbent.timestamp);
    let significantly_newer = time_delta > TWO_MINUTES_MS;
    let significantly_older = time_delta < -TWO_MINUTES_MS;
    let newer = time_delta > 0;

    // The device has likely moved since the incumbent was taken.
    if significantly_newer {
        return candidate;
    } else if significantly_older {
        return incumbent;
    }

    let accuracy_delta = candidate.accuracy - incumbent.accuracy;
    let less_accurate = accuracy_delta > 0.0;
    let more_accurate = accuracy_delta < 0.0;
    let significantly_less_accurate = accuracy_delta > SIGNIFICANT_ACCURACY_LOSS_M;
    let same_provider = candidate.provider == incumbent.provider;

    // The second branch is subsumed by the first; keep it so the decision table stays intact.
    if more_accurate {
        candidate
    } else if newer && !less_accurate {
        candidate
    } else if newer && !significantly_less_accurate && same_provider {
        candidate
    } else {
        incumbent
    }
}

/// True when `candidate` wins against `incumbent`.
pub fn is_better(candidate: &Position, incumbent: Option<&Position>) -> bool {
    std::ptr::eq(pick_better(candidate, incumbent), candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(provider: &str, accuracy: f64, timestamp: i64) -> Position {
        Position::new(provider, 59.33, 18.07, accuracy, timestamp)
    }

    #[test]
    fn test_absent_incumbent_loses() {
        let c = fix("network", 5000.0, 0);
        assert!(std::ptr::eq(pick_better(&c, None), &c));
    }

    #[test]
    fn test_significantly_newer_wins_regardless_of_accuracy() {
        let c = fix("network", 50.0, 200_000);
        let i = fix("gps", 10.0, 0);
        assert_eq!(pick_better(&c, Some(&i)), &c);

        let worse = fix("network", 10_000.0, 120_001);
        assert!(is_better(&worse, Some(&i)));
    }

    #[test]
    fn test_exactly_two_minutes_is_not_significant() {
        let c = fix("network", 500.0, 120_000);
        let i = fix("gps", 10.0, 0);
        assert!(!is_better(&c, Some(&i)));
    }

    #[test]
    fn test_significantly_older_loses_regardless_of_accuracy() {
        let c = fix("gps", 1.0, 0);
        let i = fix("network", 900.0, 120_001);
        assert!(!is_better(&c, Some(&i)));
    }

    #[test]
    fn test_more_accurate_wins_within_window() {
        let i = fix("network", 30.0, 100_000);
        // older but more precise
        let c = fix("gps", 29.5, 0);
        assert!(is_better(&c, Some(&i)));
    }

    #[test]
    fn test_less_accurate_not_significantly_newer_loses() {
        let c = fix("gps", 10.0, 1000);
        let i = fix("gps", 5.0, 500);
        assert_eq!(pick_better(&c, Some(&i)), &i);
    }

    #[test]
    fn test_newer_equal_accuracy_wins() {
        let c = fix("network", 20.0, 1001);
        let i = fix("gps", 20.0, 1000);
        assert!(is_better(&c, Some(&i)));
    }

    #[test]
    fn test_equal_fixes_keep_incumbent() {
        let c = fix("gps", 20.0, 1000);
        let i = fix("gps", 20.0, 1000);
        assert!(std::ptr::eq(pick_better(&c, Some(&i)), &i));
    }

    #[test]
    fn test_newer_same_provider_tolerates_accuracy_loss() {
        let i = fix("gps", 10.0, 0);
        let c = fix("gps", 210.0, 60_000);
        assert!(is_better(&c, Some(&i)));

        let too_coarse = fix("gps", 210.5, 60_000);
        assert!(!is_better(&too_coarse, Some(&i)));
    }

    #[test]
    fn test_newer_other_provider_with_large_loss_loses() {
        let i = fix("gps", 10.0, 0);
        let c = fix("network", 210.0, 60_000);
        assert!(!is_better(&c, Some(&i)));
    }

    #[test]
    fn test_window_accuracy_loss_of_200_other_provider_keeps_incumbent() {
        for dt in [-120_000, -1, 0, 1, 119_999, 120_000] {
            let i = fix("gps", 15.0, 500_000);
            let c = fix("network", 215.0, 500_000 + dt);
            assert!(!is_better(&c, Some(&i)), "dt={}", dt);
        }
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let c = fix("gps", 500.0, i64::MAX);
        let i = fix("network", 5.0, -1);
        assert!(is_better(&c, Some(&i)));

        let c = fix("gps", 1.0, i64::MIN);
        let i = fix("network", 900.0, i64::MAX);
        assert!(!is_better(&c, Some(&i)));
    }
}
