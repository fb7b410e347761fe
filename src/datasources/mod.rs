pub mod openweathermap;

pub use openweathermap::OpenWeatherMapClient;

use crate::error::Result;
use crate::models::{CurrentConditions, DailyWeatherObservation, ForecastDaySummary};
use std::future::Future;

/// Source of the three weather inputs an advisor cycle needs
pub trait WeatherProvider: Send + Sync {
    /// Observations for the previous `days` days, oldest first
    fn fetch_history(
        &self,
        days: u32,
    ) -> impl Future<Output = Result<Vec<DailyWeatherObservation>>> + Send;

    fn fetch_current(&self) -> impl Future<Output = Result<CurrentConditions>> + Send;

    /// Forecast grouped into calendar days, earliest first
    fn fetch_forecast(&self) -> impl Future<Output = Result<Vec<ForecastDaySummary>>> + Send;
}
