use crate::models::{DailyWeatherObservation, ForecastDaySummary};

/// Reference grass evapotranspiration under moderate conditions (mm/day)
pub const BASE_ET_MM: f64 = 4.0;

/// A day never loses less than this in the model (mm/day)
pub const MIN_DAILY_LOSS_MM: f64 = 0.5;

/// Surplus the soil can hold before the excess runs off (mm)
pub const MAX_SURPLUS_MM: f64 = 30.0;

/// Estimate daily water loss (mm) of a grass lawn.
///
/// A simplified, Penman-Monteith inspired heuristic: the baseline loss is
/// scaled by temperature, humidity, wind and cloud factors, each clamped so a
/// single extreme input cannot drive the estimate to zero or without bound.
pub fn estimate_daily_loss(max_temp: f64, humidity: f64, wind_speed: f64, cloud_cover: f64) -> f64 {
    // +8% per degree above 25°C
    let temp_factor = (1.0 + (max_temp - 25.0) * 0.08).max(0.2);

    // 50% humidity = 1.0
    let humidity_factor = (1.5 - humidity / 100.0).clamp(0.3, 2.0);

    // +10% per m/s, never below baseline
    let wind_factor = (1.0 + wind_speed * 0.1).clamp(1.0, 2.5);

    // at most 30% reduction
    let cloud_factor = (1.0 - cloud_cover / 100.0 * 0.3).clamp(0.4, 1.0);

    let et = BASE_ET_MM * temp_factor * humidity_factor * wind_factor * cloud_factor;
    et.max(MIN_DAILY_LOSS_MM)
}

/// Daily loss for an observed day
pub fn observed_loss(day: &DailyWeatherObservation) -> f64 {
    estimate_daily_loss(
        day.max_temperature,
        day.humidity,
        day.wind_speed,
        day.cloud_cover,
    )
}

/// Daily loss for a forecast day
pub fn forecast_loss(day: &ForecastDaySummary) -> f64 {
    estimate_daily_loss(day.temp_max, day.humidity_avg, day.wind_max, day.cloud_avg)
}

/// Fold a window of observed days into a soil moisture deficit (mm).
///
/// Positive means the soil is dry, negative means a surplus. Surplus credit is
/// capped at `MAX_SURPLUS_MM`; there is no upper bound on the deficit.
pub fn accumulate_deficit(observations: &[DailyWeatherObservation]) -> f64 {
    let net_balance: f64 = observations
        .iter()
        .map(|day| day.precipitation - observed_loss(day))
        .sum();

    (-net_balance).max(-MAX_SURPLUS_MM)
}

/// Total rain expected over the first `days` forecast days
pub fn upcoming_rain(forecast: &[ForecastDaySummary], days: usize) -> f64 {
    forecast.iter().take(days).map(|d| d.total_rain).sum()
}

/// Total water loss expected over the first `days` forecast days
pub fn expected_loss(forecast: &[ForecastDaySummary], days: usize) -> f64 {
    forecast.iter().take(days).map(forecast_loss).sum()
}
