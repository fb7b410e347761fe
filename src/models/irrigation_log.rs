use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Logged when the advisor recommended watering
    #[default]
    Advisor,
    /// Execution reported without a pending recommendation
    Manual,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Advisor => "advisor",
            EntryKind::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "advisor" => Some(EntryKind::Advisor),
            "manual" => Some(EntryKind::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrrigationLogEntry {
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub recommended_amount: f64,
    pub actual_amount: Option<f64>,
    pub reason: String,
    pub executed: bool,
    pub execution_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub kind: EntryKind,
}

impl IrrigationLogEntry {
    pub fn recommendation(amount: f64, reason: impl Into<String>) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            recommended_amount: amount,
            actual_amount: None,
            reason: reason.into(),
            executed: false,
            execution_timestamp: None,
            notes: None,
            kind: EntryKind::Advisor,
        }
    }

    pub fn manual(amount: f64, notes: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            timestamp: now,
            recommended_amount: amount,
            actual_amount: Some(amount),
            reason: "manual irrigation".into(),
            executed: true,
            execution_timestamp: Some(now),
            notes,
            kind: EntryKind::Manual,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Record execution. A missing amount means the recommended amount was applied.
    pub fn mark_executed(&mut self, amount: Option<f64>, notes: Option<String>, at: DateTime<Utc>) {
        self.executed = true;
        self.execution_timestamp = Some(at);
        self.actual_amount = Some(amount.unwrap_or(self.recommended_amount));
        if notes.is_some() {
            self.notes = notes;
        }
    }

    /// Water actually applied, falling back to the recommendation
    pub fn applied_amount(&self) -> f64 {
        self.actual_amount.unwrap_or(self.recommended_amount)
    }

    /// Executed within `hours` before `now`
    pub fn executed_within(&self, hours: i64, now: DateTime<Utc>) -> bool {
        let cutoff = now - Duration::hours(hours);
        self.executed
            && self
                .execution_timestamp
                .map(|t| t > cutoff && t <= now)
                .unwrap_or(false)
    }

    pub fn is_pending(&self) -> bool {
        !self.executed && self.kind == EntryKind::Advisor
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastRecommendation {
    pub time: Option<DateTime<Utc>>,
    pub amount: f64,
    pub executed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentIrrigation {
    pub count: usize,
    pub total_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSummary {
    pub last_recommendation: LastRecommendation,
    pub recent_24h: RecentIrrigation,
    pub pending_recommendations: usize,
}

impl StatusSummary {
    /// Build a summary from log entries in insertion order
    pub fn from_entries(entries: &[IrrigationLogEntry], now: DateTime<Utc>) -> Self {
        let last = entries.iter().rev().find(|e| e.kind == EntryKind::Advisor);
        let recent: Vec<&IrrigationLogEntry> = entries
            .iter()
            .filter(|e| e.executed_within(24, now))
            .collect();

        Self {
            last_recommendation: LastRecommendation {
                time: last.map(|e| e.timestamp),
                amount: last.map(|e| e.recommended_amount).unwrap_or(0.0),
                executed: last.map(|e| e.executed).unwrap_or(false),
            },
            recent_24h: RecentIrrigation {
                count: recent.len(),
                total_amount: recent
                    .iter()
                    .map(|e| e.applied_amount())
                    .fold(0.0, |acc, a| acc + a),
            },
            pending_recommendations: entries.iter().filter(|e| e.is_pending()).count(),
        }
    }
}

/// Executed entries within `hours` before `now`, most recent first
pub fn recent_executions(
    entries: &[IrrigationLogEntry],
    hours: i64,
    now: DateTime<Utc>,
) -> Vec<IrrigationLogEntry> {
    let mut recent: Vec<IrrigationLogEntry> = entries
        .iter()
        .filter(|e| e.executed_within(hours, now))
        .cloned()
        .collect();
    recent.sort_by(|a, b| b.execution_timestamp.cmp(&a.execution_timestamp));
    recent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_executed_defaults_to_recommended_amount() {
        let mut entry = IrrigationLogEntry::recommendation(12.0, "dry");
        entry.mark_executed(None, None, Utc::now());
        assert!(entry.executed);
        assert_eq!(entry.actual_amount, Some(12.0));
        assert!(entry.execution_timestamp.is_some());
    }

    #[test]
    fn mark_executed_keeps_reported_amount_and_notes() {
        let mut entry = IrrigationLogEntry::recommendation(12.0, "dry");
        entry.mark_executed(Some(9.5), Some("sprinkler".into()), Utc::now());
        assert_eq!(entry.applied_amount(), 9.5);
        assert_eq!(entry.notes.as_deref(), Some("sprinkler"));
    }

    #[test]
    fn executed_within_window() {
        let now = Utc::now();
        let mut entry = IrrigationLogEntry::recommendation(10.0, "dry");
        assert!(!entry.executed_within(6, now));

        entry.mark_executed(None, None, now - Duration::hours(2));
        assert!(entry.executed_within(6, now));
        assert!(!entry.executed_within(1, now));
    }

    #[test]
    fn manual_entries_are_never_pending() {
        let entry = IrrigationLogEntry::manual(5.0, None);
        assert!(entry.executed);
        assert!(!entry.is_pending());
        assert_eq!(entry.kind, EntryKind::Manual);
    }

    #[test]
    fn status_summary_counts() {
        let now = Utc::now();
        let mut done = IrrigationLogEntry::recommendation(10.0, "dry")
            .with_timestamp(now - Duration::hours(5));
        done.mark_executed(Some(8.0), None, now - Duration::hours(4));
        let old_pending = IrrigationLogEntry::recommendation(6.0, "dry")
            .with_timestamp(now - Duration::hours(3));
        let latest = IrrigationLogEntry::recommendation(15.0, "hot")
            .with_timestamp(now - Duration::hours(1));

        let summary = StatusSummary::from_entries(&[done, old_pending, latest], now);

        assert_eq!(summary.pending_recommendations, 2);
        assert_eq!(summary.recent_24h.count, 1);
        assert_eq!(summary.recent_24h.total_amount, 8.0);
        assert_eq!(summary.last_recommendation.amount, 15.0);
        assert!(!summary.last_recommendation.executed);
    }

    #[test]
    fn status_summary_empty_log() {
        let summary = StatusSummary::from_entries(&[], Utc::now());
        assert!(summary.last_recommendation.time.is_none());
        assert_eq!(summary.pending_recommendations, 0);
        assert_eq!(summary.recent_24h.count, 0);
        assert!(summary.recent_24h.total_amount.is_sign_positive());
    }

    #[test]
    fn recent_executions_newest_first() {
        let now = Utc::now();
        let mut a = IrrigationLogEntry::recommendation(5.0, "a");
        a.mark_executed(None, None, now - Duration::hours(10));
        let mut b = IrrigationLogEntry::recommendation(7.0, "b");
        b.mark_executed(None, None, now - Duration::hours(2));
        let mut stale = IrrigationLogEntry::recommendation(9.0, "c");
        stale.mark_executed(None, None, now - Duration::hours(72));

        let recent = recent_executions(&[a, b, stale], 48, now);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].reason, "b");
        assert_eq!(recent[1].reason, "a");
    }

    #[test]
    fn entry_kind_round_trip_strings() {
        assert_eq!(EntryKind::from_str("Manual"), Some(EntryKind::Manual));
        assert_eq!(EntryKind::from_str(EntryKind::Advisor.as_str()), Some(EntryKind::Advisor));
        assert_eq!(EntryKind::from_str("other"), None);
    }
}
