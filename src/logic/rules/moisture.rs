use super::{DecisionInputs, Rule, RuleOutcome};
use crate::models::IrrigationAction;

/// Upper bound for a single full watering (mm)
pub const MAX_FULL_AMOUNT_MM: f64 = 25.0;

/// Amount for a light top-up (mm)
pub const LIGHT_AMOUNT_MM: f64 = 8.0;

/// Soil holds more water than the lawn needs
pub struct SurplusRule;

impl Rule for SurplusRule {
    fn id(&self) -> &'static str {
        "surplus"
    }

    fn name(&self) -> &'static str {
        "Moisture Surplus"
    }

    fn evaluate(&self, inputs: &DecisionInputs) -> Option<RuleOutcome> {
        if inputs.deficit < -5.0 {
            return Some(RuleOutcome::skip(
                IrrigationAction::None,
                95,
                format!("Soil has {:.1}mm surplus moisture", -inputs.deficit),
            ));
        }
        None
    }
}

/// Large deficit: water most of it back
///
/// Applies 70% of the deficit, capped at 25mm per watering.
pub struct HighDeficitRule;

impl Rule for HighDeficitRule {
    fn id(&self) -> &'static str {
        "high_deficit"
    }

    fn name(&self) -> &'static str {
        "High Moisture Deficit"
    }

    fn evaluate(&self, inputs: &DecisionInputs) -> Option<RuleOutcome> {
        if inputs.deficit <= 15.0 {
            return None;
        }

        let amount = (inputs.deficit * 0.7).min(MAX_FULL_AMOUNT_MM);
        Some(RuleOutcome::new(
            IrrigationAction::Full,
            amount,
            90,
            format!("High soil moisture deficit ({:.1}mm)", inputs.deficit),
        ))
    }
}

/// Expected rain over the next three days covers the expected loss
pub struct ForecastCoverageRule;

impl Rule for ForecastCoverageRule {
    fn id(&self) -> &'static str {
        "forecast_coverage"
    }

    fn name(&self) -> &'static str {
        "Forecast Rain Coverage"
    }

    fn evaluate(&self, inputs: &DecisionInputs) -> Option<RuleOutcome> {
        if inputs.upcoming_rain_3d > inputs.expected_loss_3d {
            return Some(RuleOutcome::skip(
                IrrigationAction::None,
                80,
                format!(
                    "Forecast rain ({:.1}mm) will cover water loss ({:.1}mm)",
                    inputs.upcoming_rain_3d, inputs.expected_loss_3d
                ),
            ));
        }
        None
    }
}

/// Small deficit: top up only when little rain is coming
pub struct SmallDeficitRule;

impl Rule for SmallDeficitRule {
    fn id(&self) -> &'static str {
        "small_deficit"
    }

    fn name(&self) -> &'static str {
        "Small Moisture Deficit"
    }

    fn evaluate(&self, inputs: &DecisionInputs) -> Option<RuleOutcome> {
        if !(inputs.deficit > 0.0 && inputs.deficit <= 5.0) {
            return None;
        }

        if inputs.upcoming_rain_3d < inputs.expected_loss_3d * 0.3 {
            Some(RuleOutcome::new(
                IrrigationAction::Light,
                LIGHT_AMOUNT_MM,
                60,
                "Light watering to maintain optimal moisture",
            ))
        } else {
            Some(RuleOutcome::skip(
                IrrigationAction::None,
                65,
                "Small deficit will be handled by forecast rain",
            ))
        }
    }
}

/// Catch-all at the end of the table
pub struct AdequateMoistureRule;

impl Rule for AdequateMoistureRule {
    fn id(&self) -> &'static str {
        "adequate_moisture"
    }

    fn name(&self) -> &'static str {
        "Adequate Moisture"
    }

    fn evaluate(&self, _inputs: &DecisionInputs) -> Option<RuleOutcome> {
        Some(RuleOutcome::skip(
            IrrigationAction::None,
            75,
            "Soil moisture levels are adequate",
        ))
    }
}
