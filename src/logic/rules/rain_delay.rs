use super::{DecisionInputs, Rule, RuleOutcome};
use crate::models::IrrigationAction;

/// It is raining hard enough right now to water the lawn
///
/// Conditions:
/// - current conditions report rain
/// - intensity above 2 mm/h
pub struct ActiveRainRule;

impl Rule for ActiveRainRule {
    fn id(&self) -> &'static str {
        "active_rain"
    }

    fn name(&self) -> &'static str {
        "Currently Raining"
    }

    fn evaluate(&self, inputs: &DecisionInputs) -> Option<RuleOutcome> {
        let current = inputs.current;
        if current.is_raining && current.rain_intensity > 2.0 {
            return Some(RuleOutcome::skip(
                IrrigationAction::None,
                95,
                format!(
                    "Currently raining ({:.1}mm/h)",
                    current.rain_intensity
                ),
            ));
        }
        None
    }
}

/// Significant rain forecast for today: hold off
pub struct RainExpectedRule;

impl Rule for RainExpectedRule {
    fn id(&self) -> &'static str {
        "rain_expected"
    }

    fn name(&self) -> &'static str {
        "Rain Expected Today"
    }

    fn evaluate(&self, inputs: &DecisionInputs) -> Option<RuleOutcome> {
        let rain_today = inputs.today().total_rain;
        if rain_today > 10.0 {
            return Some(RuleOutcome::skip(
                IrrigationAction::Wait,
                85,
                format!("Significant rain expected today ({:.1}mm)", rain_today),
            ));
        }
        None
    }
}
