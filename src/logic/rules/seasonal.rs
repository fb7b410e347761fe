use super::moisture::LIGHT_AMOUNT_MM;
use super::RuleOutcome;
use crate::models::IrrigationAction;
use chrono::{Datelike, NaiveDate};

/// Late summer override
///
/// July to September are dry months. When the table decided not to water
/// although the deficit is above 8mm, upgrade to a light watering. Applied
/// after the table, so it sees whichever rule matched.
pub struct SeasonalAdjustment;

impl SeasonalAdjustment {
    pub fn id(&self) -> &'static str {
        "seasonal_late_summer"
    }

    pub fn applies(&self, outcome: &RuleOutcome, deficit: f64, today: NaiveDate) -> bool {
        (7..=9).contains(&today.month())
            && outcome.action == IrrigationAction::None
            && deficit > 8.0
    }

    /// Returns the extra reason when the override fired
    pub fn apply(&self, outcome: &mut RuleOutcome, deficit: f64, today: NaiveDate) -> Option<String> {
        if !self.applies(outcome, deficit, today) {
            return None;
        }

        outcome.action = IrrigationAction::Light;
        outcome.amount_mm = outcome.amount_mm.max(LIGHT_AMOUNT_MM);
        outcome.confidence = outcome.confidence.saturating_sub(10).max(60);
        Some("Late summer adjustment: dry season".to_string())
    }
}
