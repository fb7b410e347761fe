use crate::models::IrrigationLogEntry;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Default look-back window for recent irrigation
pub const DEFAULT_WINDOW_HOURS: i64 = 6;

/// Irrigation above this total inside the window suppresses a new watering (mm)
pub const SUPPRESS_THRESHOLD_MM: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Suppression {
    pub suppress: bool,
    pub recent_total_mm: f64,
}

/// Check whether enough water was applied recently to skip watering.
///
/// Counts executed entries by execution time; each contributes the amount
/// actually applied, or the recommended amount when none was reported.
pub fn should_suppress(
    log: &[IrrigationLogEntry],
    window_hours: i64,
    now: DateTime<Utc>,
) -> Suppression {
    // fold from +0.0, an empty f64 sum is -0.0
    let recent_total_mm = log
        .iter()
        .filter(|e| e.executed_within(window_hours, now))
        .map(|e| e.applied_amount())
        .fold(0.0, |acc, amount| acc + amount);

    Suppression {
        suppress: recent_total_mm > SUPPRESS_THRESHOLD_MM,
        recent_total_mm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn executed(amount: f64, actual: Option<f64>, hours_ago: i64, now: DateTime<Utc>) -> IrrigationLogEntry {
        let mut entry = IrrigationLogEntry::recommendation(amount, "dry")
            .with_timestamp(now - Duration::hours(hours_ago + 1));
        entry.mark_executed(actual, None, now - Duration::hours(hours_ago));
        entry
    }

    #[test]
    fn empty_log_totals_positive_zero() {
        let result = should_suppress(&[], DEFAULT_WINDOW_HOURS, Utc::now());
        assert!(!result.suppress);
        assert!(result.recent_total_mm.is_sign_positive());
        assert_eq!(
            serde_json::to_value(result).unwrap()["recent_total_mm"].to_string(),
            "0.0"
        );
    }

    #[test]
    fn six_mm_recently_suppresses() {
        let now = Utc::now();
        let log = vec![executed(6.0, None, 2, now)];
        let result = should_suppress(&log, DEFAULT_WINDOW_HOURS, now);
        assert_eq!(
            result,
            Suppression {
                suppress: true,
                recent_total_mm: 6.0
            }
        );
    }

    #[test]
    fn four_mm_recently_does_not_suppress() {
        let now = Utc::now();
        let log = vec![executed(4.0, None, 2, now)];
        let result = should_suppress(&log, DEFAULT_WINDOW_HOURS, now);
        assert!(!result.suppress);
        assert_eq!(result.recent_total_mm, 4.0);
    }

    #[test]
    fn exactly_threshold_does_not_suppress() {
        let now = Utc::now();
        let log = vec![executed(5.0, None, 1, now)];
        assert!(!should_suppress(&log, 6, now).suppress);
    }

    #[test]
    fn actual_amount_wins_over_recommended() {
        let now = Utc::now();
        let log = vec![executed(15.0, Some(3.0), 1, now)];
        let result = should_suppress(&log, 6, now);
        assert!(!result.suppress);
        assert_eq!(result.recent_total_mm, 3.0);
    }

    #[test]
    fn amounts_sum_inside_window_only() {
        let now = Utc::now();
        let log = vec![
            executed(3.0, None, 1, now),
            executed(3.0, None, 4, now),
            executed(20.0, None, 8, now),
        ];
        let result = should_suppress(&log, 6, now);
        assert!(result.suppress);
        assert_eq!(result.recent_total_mm, 6.0);
    }

    #[test]
    fn pending_recommendations_are_ignored() {
        let now = Utc::now();
        let log = vec![IrrigationLogEntry::recommendation(20.0, "dry")];
        let result = should_suppress(&log, 6, now);
        assert!(!result.suppress);
        assert_eq!(result.recent_total_mm, 0.0);
    }

    #[test]
    fn empty_log() {
        let result = should_suppress(&[], 6, Utc::now());
        assert!(!result.suppress);
        assert_eq!(result.recent_total_mm, 0.0);
    }
}
