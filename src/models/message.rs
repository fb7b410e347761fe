use super::recommendation::{round1, IrrigationRecommendation};
use serde::{Deserialize, Serialize};

pub const DATA_FETCH_FAILED_REASON: &str = "data fetch failed";

/// The three-field message consumed by the home automation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleMessage {
    pub watering_required: bool,
    pub water_amount_lpm2: f64,
    pub reason: String,
}

impl SimpleMessage {
    /// Fallback published when any weather data could not be fetched
    pub fn data_fetch_failed() -> Self {
        Self {
            watering_required: false,
            water_amount_lpm2: 0.0,
            reason: DATA_FETCH_FAILED_REASON.to_string(),
        }
    }

    /// Replacement for a watering message when irrigation already happened recently
    pub fn recently_irrigated(recent_total_mm: f64) -> Self {
        Self {
            watering_required: false,
            water_amount_lpm2: 0.0,
            reason: format!(
                "Recently irrigated ({} L/m²), skipping for now",
                round1(recent_total_mm)
            ),
        }
    }
}

impl From<&IrrigationRecommendation> for SimpleMessage {
    fn from(rec: &IrrigationRecommendation) -> Self {
        Self {
            watering_required: rec.action.requires_watering(),
            water_amount_lpm2: rec.amount_lpm2(),
            reason: rec.primary_reason().to_string(),
        }
    }
}
