use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IrrigationAction {
    None,
    Wait,
    Light,
    Full,
}

impl IrrigationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            IrrigationAction::None => "none",
            IrrigationAction::Wait => "wait",
            IrrigationAction::Light => "light",
            IrrigationAction::Full => "full",
        }
    }

    /// Whether the lawn should be watered now
    pub fn requires_watering(&self) -> bool {
        matches!(self, IrrigationAction::Full | IrrigationAction::Light)
    }
}

impl std::fmt::Display for IrrigationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionsSnapshot {
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastHighlight {
    pub date: NaiveDate,
    pub temp_max: f64,
    pub expected_rain: f64,
}

/// Inputs the decision was based on, kept for display and publishing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataAnalysis {
    pub soil_moisture_deficit_mm: f64,
    pub currently_raining: bool,
    pub current_rain_intensity: f64,
    pub upcoming_rain_3days_mm: f64,
    pub expected_water_loss_3days_mm: f64,
    pub current_conditions: ConditionsSnapshot,
    pub forecast_highlights: Vec<ForecastHighlight>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrrigationRecommendation {
    pub action: IrrigationAction,
    pub amount_mm: f64,
    pub confidence_percent: u8,
    pub reasons: Vec<String>,
    /// Id of the rule that matched in the decision table
    pub rule_id: String,
    pub seasonal_adjustment: bool,
    pub analysis: DataAnalysis,
    pub created_at: DateTime<Utc>,
}

impl IrrigationRecommendation {
    pub fn primary_reason(&self) -> &str {
        self.reasons.first().map(String::as_str).unwrap_or("unknown")
    }

    /// Liters per square meter. 1 mm of water over 1 m² is exactly 1 liter.
    pub fn amount_lpm2(&self) -> f64 {
        self.amount_mm
    }

    pub fn deficit_mm(&self) -> f64 {
        self.analysis.soil_moisture_deficit_mm
    }
}

/// Round to one decimal place, the precision amounts are reported with
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
