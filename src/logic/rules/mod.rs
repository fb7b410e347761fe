pub mod engine;
pub mod heat_stress;
pub mod moisture;
pub mod rain_delay;
pub mod seasonal;

pub use engine::DecisionEngine;

use crate::models::{CurrentConditions, ForecastDaySummary, IrrigationAction};

/// Everything a rule may look at, computed once per decision
#[derive(Debug, Clone)]
pub struct DecisionInputs<'a> {
    pub deficit: f64,
    pub current: &'a CurrentConditions,
    /// The first three forecast days
    pub forecast: &'a [ForecastDaySummary],
    pub upcoming_rain_3d: f64,
    pub expected_loss_3d: f64,
}

impl DecisionInputs<'_> {
    pub fn today(&self) -> &ForecastDaySummary {
        &self.forecast[0]
    }
}

/// What a matching rule decided
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub action: IrrigationAction,
    pub amount_mm: f64,
    pub confidence: u8,
    pub reason: String,
}

impl RuleOutcome {
    pub fn new(action: IrrigationAction, amount_mm: f64, confidence: u8, reason: impl Into<String>) -> Self {
        Self {
            action,
            amount_mm,
            confidence,
            reason: reason.into(),
        }
    }

    /// No watering, with the amount forced to zero
    pub fn skip(action: IrrigationAction, confidence: u8, reason: impl Into<String>) -> Self {
        Self::new(action, 0.0, confidence, reason)
    }
}

/// One row of the ordered decision table
pub trait Rule: Send + Sync {
    /// Unique identifier for this rule
    fn id(&self) -> &'static str;

    /// Human-readable name
    fn name(&self) -> &'static str;

    /// Return an outcome if this rule's condition holds
    fn evaluate(&self, inputs: &DecisionInputs) -> Option<RuleOutcome>;
}
