use super::{
    heat_stress::{HeatStressRule, HotDryRule},
    moisture::{
        AdequateMoistureRule, ForecastCoverageRule, HighDeficitRule, SmallDeficitRule, SurplusRule,
    },
    rain_delay::{ActiveRainRule, RainExpectedRule},
    seasonal::SeasonalAdjustment,
    DecisionInputs, Rule, RuleOutcome,
};
use crate::error::{AdvisorError, Result};
use crate::logic::calculations::{expected_loss, upcoming_rain};
use crate::models::{
    round1, ConditionsSnapshot, CurrentConditions, DataAnalysis, ForecastDaySummary,
    ForecastHighlight, IrrigationAction, IrrigationRecommendation,
};
use chrono::{NaiveDate, Utc};

/// Days of forecast the decision looks at
pub const FORECAST_HORIZON_DAYS: usize = 3;

/// Ordered first-match decision table followed by the seasonal override
pub struct DecisionEngine {
    rules: Vec<Box<dyn Rule>>,
    seasonal: SeasonalAdjustment,
}

impl DecisionEngine {
    pub fn new() -> Self {
        // Order matters: the first rule that matches wins
        let rules: Vec<Box<dyn Rule>> = vec![
            Box::new(SurplusRule),
            Box::new(ActiveRainRule),
            Box::new(RainExpectedRule),
            Box::new(HighDeficitRule),
            Box::new(HeatStressRule),
            Box::new(HotDryRule),
            Box::new(ForecastCoverageRule),
            Box::new(SmallDeficitRule),
            Box::new(AdequateMoistureRule),
        ];

        Self {
            rules,
            seasonal: SeasonalAdjustment,
        }
    }

    /// Decide whether and how much to water.
    ///
    /// Needs at least three forecast days; anything shorter is an error rather
    /// than a decision on partial data.
    pub fn recommend(
        &self,
        deficit: f64,
        current: &CurrentConditions,
        forecast: &[ForecastDaySummary],
        today: NaiveDate,
    ) -> Result<IrrigationRecommendation> {
        if forecast.len() < FORECAST_HORIZON_DAYS {
            return Err(AdvisorError::InsufficientForecast {
                available: forecast.len(),
            });
        }

        let horizon = &forecast[..FORECAST_HORIZON_DAYS];
        let inputs = DecisionInputs {
            deficit,
            current,
            forecast: horizon,
            upcoming_rain_3d: upcoming_rain(horizon, FORECAST_HORIZON_DAYS),
            expected_loss_3d: expected_loss(horizon, FORECAST_HORIZON_DAYS),
        };

        let (rule_id, mut outcome) = self.first_match(&inputs);
        tracing::debug!(rule = rule_id, action = %outcome.action, "Decision rule matched");

        let mut reasons = vec![outcome.reason.clone()];
        let seasonal_reason = self.seasonal.apply(&mut outcome, deficit, today);
        let seasonal_adjustment = seasonal_reason.is_some();
        if let Some(reason) = seasonal_reason {
            tracing::debug!(rule = self.seasonal.id(), "Seasonal override applied");
            reasons.push(reason);
        }

        let amount_mm = if outcome.action.requires_watering() {
            round1(outcome.amount_mm)
        } else {
            0.0
        };

        Ok(IrrigationRecommendation {
            action: outcome.action,
            amount_mm,
            confidence_percent: outcome.confidence,
            reasons,
            rule_id: rule_id.to_string(),
            seasonal_adjustment,
            analysis: analysis(&inputs),
            created_at: Utc::now(),
        })
    }

    fn first_match(&self, inputs: &DecisionInputs) -> (&'static str, RuleOutcome) {
        self.rules
            .iter()
            .find_map(|rule| rule.evaluate(inputs).map(|outcome| (rule.id(), outcome)))
            .unwrap_or_else(|| {
                // The table ends in a catch-all, this only guards an empty table
                (
                    "adequate_moisture",
                    RuleOutcome::skip(IrrigationAction::None, 75, "Soil moisture levels are adequate"),
                )
            })
    }

    pub fn list_rules(&self) -> Vec<(&'static str, &'static str)> {
        self.rules.iter().map(|r| (r.id(), r.name())).collect()
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn analysis(inputs: &DecisionInputs) -> DataAnalysis {
    let current = inputs.current;
    DataAnalysis {
        soil_moisture_deficit_mm: round1(inputs.deficit),
        currently_raining: current.is_raining,
        current_rain_intensity: current.rain_intensity,
        upcoming_rain_3days_mm: round1(inputs.upcoming_rain_3d),
        expected_water_loss_3days_mm: round1(inputs.expected_loss_3d),
        current_conditions: ConditionsSnapshot {
            temperature: current.temperature,
            humidity: current.humidity,
            wind_speed: current.wind_speed,
            description: current.description.clone(),
        },
        forecast_highlights: inputs
            .forecast
            .iter()
            .map(|day| ForecastHighlight {
                date: day.date,
                temp_max: day.temp_max,
                expected_rain: day.total_rain,
            })
            .collect(),
    }
}
