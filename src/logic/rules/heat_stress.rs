use super::{DecisionInputs, Rule, RuleOutcome};
use crate::models::IrrigationAction;

/// Moderate deficit ahead of a hot day
///
/// Conditions:
/// - deficit above 8mm
/// - today's forecast maximum above 30°C
pub struct HeatStressRule;

impl Rule for HeatStressRule {
    fn id(&self) -> &'static str {
        "heat_stress"
    }

    fn name(&self) -> &'static str {
        "Heat Stress"
    }

    fn evaluate(&self, inputs: &DecisionInputs) -> Option<RuleOutcome> {
        let temp_max = inputs.today().temp_max;
        if inputs.deficit > 8.0 && temp_max > 30.0 {
            return Some(RuleOutcome::new(
                IrrigationAction::Full,
                15.0,
                75,
                format!(
                    "Moderate deficit ({:.1}mm) with high temperature ({:.1}°C)",
                    inputs.deficit, temp_max
                ),
            ));
        }
        None
    }
}

/// Small deficit but a very hot, dry day
///
/// Conditions:
/// - deficit above 5mm
/// - today's forecast maximum above 32°C
/// - current humidity below 30%
pub struct HotDryRule;

impl Rule for HotDryRule {
    fn id(&self) -> &'static str {
        "hot_dry"
    }

    fn name(&self) -> &'static str {
        "Hot And Dry"
    }

    fn evaluate(&self, inputs: &DecisionInputs) -> Option<RuleOutcome> {
        let temp_max = inputs.today().temp_max;
        let humidity = inputs.current.humidity;
        if inputs.deficit > 5.0 && temp_max > 32.0 && humidity < 30.0 {
            return Some(RuleOutcome::new(
                IrrigationAction::Full,
                10.0,
                70,
                format!(
                    "Hot and dry conditions ({:.1}°C, {:.0}% humidity)",
                    temp_max, humidity
                ),
            ));
        }
        None
    }
}
