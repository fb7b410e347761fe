use super::WeatherProvider;
use crate::config::OpenWeatherMapConfig;
use crate::error::{AdvisorError, Result};
use crate::models::{
    CurrentConditions, DailyWeatherObservation, ForecastDaySummary, WeatherCondition,
};
use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::HashMap;

const API_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";
const ONE_CALL_BASE_URL: &str = "https://api.openweathermap.org/data/3.0/onecall";

/// Pause between day_summary calls
const HISTORY_REQUEST_DELAY_MS: u64 = 100;

pub struct OpenWeatherMapClient {
    client: reqwest::Client,
    config: OpenWeatherMapConfig,
}

// One Call 3.0 day_summary response
#[derive(Debug, Deserialize)]
struct OwmDaySummary {
    date: NaiveDate,
    temperature: OwmDayTemperature,
    humidity: OwmAfternoon,
    precipitation: OwmTotal,
    wind: OwmDayWind,
    cloud_cover: OwmAfternoon,
}

#[derive(Debug, Deserialize)]
struct OwmDayTemperature {
    max: f64,
}

#[derive(Debug, Deserialize)]
struct OwmAfternoon {
    afternoon: f64,
}

#[derive(Debug, Deserialize)]
struct OwmTotal {
    total: f64,
}

#[derive(Debug, Deserialize)]
struct OwmDayWind {
    max: OwmWindSpeed,
}

#[derive(Debug, Deserialize)]
struct OwmWindSpeed {
    speed: f64,
}

// 2.5 current weather response
#[derive(Debug, Deserialize)]
struct OwmCurrentResponse {
    weather: Vec<OwmWeather>,
    main: OwmMain,
    wind: OwmWind,
    clouds: OwmClouds,
    // Absent when it is not raining
    #[serde(default)]
    rain: Option<OwmRainHour>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwmRainHour {
    #[serde(rename = "1h", default)]
    one_hour: f64,
}

// 2.5 forecast response
#[derive(Debug, Deserialize)]
struct OwmForecastResponse {
    list: Vec<OwmForecastItem>,
}

#[derive(Debug, Deserialize)]
struct OwmForecastItem {
    dt: i64,
    main: OwmMain,
    weather: Vec<OwmWeather>,
    clouds: OwmClouds,
    wind: OwmWind,
    #[serde(default)]
    rain: Option<OwmPrecipitation>,
    #[serde(default)]
    snow: Option<OwmPrecipitation>,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct OwmWeather {
    id: u32,
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwmClouds {
    all: f64, // cloudiness percentage
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwmPrecipitation {
    #[serde(rename = "3h", default)]
    three_hour: f64,
}

impl OpenWeatherMapClient {
    pub fn new(config: OpenWeatherMapConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Fetch the daily summary for one past date
    pub async fn fetch_day_summary(&self, date: NaiveDate) -> Result<DailyWeatherObservation> {
        let url = format!(
            "{}/day_summary?lat={}&lon={}&date={}&appid={}&units=metric",
            ONE_CALL_BASE_URL,
            self.config.latitude,
            self.config.longitude,
            date.format("%Y-%m-%d"),
            self.config.api_key
        );

        let summary: OwmDaySummary = self.get_json(&url).await?;
        Ok(convert_day_summary(summary))
    }

    /// Fetch `days` days of history ending yesterday, oldest first.
    ///
    /// A day that fails is logged and skipped; only a window with no usable
    /// day at all is an error.
    pub async fn fetch_history(&self, days: u32) -> Result<Vec<DailyWeatherObservation>> {
        let today = Local::now().date_naive();
        let mut observations = Vec::with_capacity(days as usize);

        for offset in (1..=days).rev() {
            let date = today - Duration::days(i64::from(offset));
            match self.fetch_day_summary(date).await {
                Ok(day) => observations.push(day),
                Err(e) => tracing::warn!(%date, error = %e, "Skipping history day"),
            }

            tokio::time::sleep(std::time::Duration::from_millis(HISTORY_REQUEST_DELAY_MS)).await;
        }

        if observations.is_empty() {
            return Err(AdvisorError::DataFetch(format!(
                "no history available for the last {} days",
                days
            )));
        }

        tracing::debug!(
            requested = days,
            received = observations.len(),
            "Fetched weather history"
        );
        Ok(observations)
    }

    /// Fetch current conditions
    pub async fn fetch_current(&self) -> Result<CurrentConditions> {
        let url = format!(
            "{}/weather?lat={}&lon={}&appid={}&units=metric",
            API_BASE_URL, self.config.latitude, self.config.longitude, self.config.api_key
        );

        let response: OwmCurrentResponse = self.get_json(&url).await?;
        Ok(convert_current(response))
    }

    /// Fetch 5-day/3-hour forecast grouped into days
    pub async fn fetch_forecast(&self) -> Result<Vec<ForecastDaySummary>> {
        let url = format!(
            "{}/forecast?lat={}&lon={}&appid={}&units=metric",
            API_BASE_URL, self.config.latitude, self.config.longitude, self.config.api_key
        );

        let response: OwmForecastResponse = self.get_json(&url).await?;
        Ok(aggregate_daily(&response.list))
    }

    /// Test connection to OpenWeatherMap API
    pub async fn test_connection(&self) -> Result<bool> {
        let url = format!(
            "{}/weather?lat={}&lon={}&appid={}&units=metric",
            API_BASE_URL, self.config.latitude, self.config.longitude, self.config.api_key
        );

        let response =
            self.client.get(&url).send().await.map_err(|e| {
                AdvisorError::DataFetch(format!("OpenWeatherMap: {}", e))
            })?;

        Ok(response.status().is_success())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response =
            self.client.get(url).send().await.map_err(|e| {
                AdvisorError::DataFetch(format!("OpenWeatherMap: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AdvisorError::DataFetch(format!(
                "OpenWeatherMap returned {}: {}",
                status, body
            )));
        }

        response.json().await.map_err(|e| {
            AdvisorError::DataFetch(format!(
                "Failed to parse OpenWeatherMap response: {}",
                e
            ))
        })
    }
}

impl WeatherProvider for OpenWeatherMapClient {
    async fn fetch_history(&self, days: u32) -> Result<Vec<DailyWeatherObservation>> {
        OpenWeatherMapClient::fetch_history(self, days).await
    }

    async fn fetch_current(&self) -> Result<CurrentConditions> {
        OpenWeatherMapClient::fetch_current(self).await
    }

    async fn fetch_forecast(&self) -> Result<Vec<ForecastDaySummary>> {
        OpenWeatherMapClient::fetch_forecast(self).await
    }
}

fn convert_day_summary(summary: OwmDaySummary) -> DailyWeatherObservation {
    DailyWeatherObservation {
        date: summary.date,
        max_temperature: summary.temperature.max,
        humidity: summary.humidity.afternoon,
        wind_speed: summary.wind.max.speed,
        cloud_cover: summary.cloud_cover.afternoon,
        precipitation: summary.precipitation.total,
    }
}

fn convert_current(response: OwmCurrentResponse) -> CurrentConditions {
    let weather = response.weather.first();
    let condition = weather
        .map(|w| WeatherCondition::from_owm_id(w.id))
        .unwrap_or_default();
    let rain_intensity = response.rain.map(|r| r.one_hour).unwrap_or(0.0);

    CurrentConditions {
        temperature: response.main.temp,
        humidity: response.main.humidity,
        wind_speed: response.wind.speed,
        cloud_cover: response.clouds.all,
        is_raining: rain_intensity > 0.0 || condition.is_rain(),
        rain_intensity,
        description: weather.map(|w| w.description.clone()).unwrap_or_default(),
        condition,
        location: response.name.filter(|n| !n.is_empty()),
    }
}

fn aggregate_daily(items: &[OwmForecastItem]) -> Vec<ForecastDaySummary> {
    // Group by UTC date
    let mut by_date: HashMap<NaiveDate, Vec<&OwmForecastItem>> = HashMap::new();
    for item in items {
        let timestamp = DateTime::from_timestamp(item.dt, 0).unwrap_or_else(Utc::now);
        by_date.entry(timestamp.date_naive()).or_default().push(item);
    }

    // Convert to sorted daily summaries
    let mut days: Vec<ForecastDaySummary> = by_date
        .into_iter()
        .map(|(date, slots)| aggregate_day(date, &slots))
        .collect();

    days.sort_by_key(|d| d.date);
    days
}

fn aggregate_day(date: NaiveDate, slots: &[&OwmForecastItem]) -> ForecastDaySummary {
    let count = slots.len().max(1) as f64;

    let temp_max = slots
        .iter()
        .map(|s| s.main.temp)
        .fold(f64::NEG_INFINITY, f64::max);
    let temp_min = slots
        .iter()
        .map(|s| s.main.temp)
        .fold(f64::INFINITY, f64::min);

    // Combine rain and snow precipitation
    let precipitation: Vec<f64> = slots
        .iter()
        .map(|s| {
            s.rain.as_ref().map(|r| r.three_hour).unwrap_or(0.0)
                + s.snow.as_ref().map(|r| r.three_hour).unwrap_or(0.0)
        })
        .collect();

    let mut descriptions: Vec<String> = Vec::new();
    for slot in slots {
        if let Some(w) = slot.weather.first() {
            if !descriptions.contains(&w.description) {
                descriptions.push(w.description.clone());
            }
        }
    }

    ForecastDaySummary {
        date,
        total_rain: precipitation.iter().sum(),
        temp_max,
        temp_min,
        humidity_avg: slots.iter().map(|s| s.main.humidity).sum::<f64>() / count,
        wind_max: slots.iter().map(|s| s.wind.speed).fold(0.0, f64::max),
        cloud_avg: slots.iter().map(|s| s.clouds.all).sum::<f64>() / count,
        rain_periods: precipitation.iter().filter(|p| **p > 0.0).count() as u32,
        descriptions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_SUMMARY: &str = r#"{
        "lat": 47.5, "lon": 19.04, "tz": "+02:00", "date": "2025-08-20", "units": "metric",
        "cloud_cover": {"afternoon": 20},
        "humidity": {"afternoon": 35},
        "precipitation": {"total": 1.5},
        "temperature": {"min": 18.2, "max": 31.4, "afternoon": 30.1, "night": 20.0,
                        "evening": 27.0, "morning": 19.5},
        "pressure": {"afternoon": 1015},
        "wind": {"max": {"speed": 4.2, "direction": 120}}
    }"#;

    const CURRENT_RAIN: &str = r#"{
        "weather": [{"id": 501, "main": "Rain", "description": "moderate rain", "icon": "10d"}],
        "main": {"temp": 19.5, "feels_like": 19.8, "humidity": 88, "pressure": 1009},
        "wind": {"speed": 3.1, "deg": 200},
        "clouds": {"all": 90},
        "rain": {"1h": 2.7},
        "name": "Budapest"
    }"#;

    fn forecast_item(dt: i64, temp: f64, rain: Option<f64>, description: &str) -> String {
        let rain = rain
            .map(|r| format!(r#","rain": {{"3h": {}}}"#, r))
            .unwrap_or_default();
        format!(
            r#"{{"dt": {dt}, "main": {{"temp": {temp}, "feels_like": {temp}, "humidity": 60}},
                "weather": [{{"id": 800, "main": "Clear", "description": "{description}"}}],
                "clouds": {{"all": 40}}, "wind": {{"speed": 2.5}}, "pop": 0.2{rain}}}"#
        )
    }

    fn sample_config() -> OpenWeatherMapConfig {
        OpenWeatherMapConfig {
            api_key: "test_key".to_string(),
            latitude: 47.4979,
            longitude: 19.0402,
            history_days: 7,
        }
    }

    #[test]
    fn client_creation() {
        let client = OpenWeatherMapClient::new(sample_config());
        assert_eq!(client.config.history_days, 7);
    }

    #[test]
    fn parses_day_summary() {
        let summary: OwmDaySummary = serde_json::from_str(DAY_SUMMARY).unwrap();
        let day = convert_day_summary(summary);
        assert_eq!(day.date, NaiveDate::from_ymd_opt(2025, 8, 20).unwrap());
        assert_eq!(day.max_temperature, 31.4);
        assert_eq!(day.humidity, 35.0);
        assert_eq!(day.wind_speed, 4.2);
        assert_eq!(day.cloud_cover, 20.0);
        assert_eq!(day.precipitation, 1.5);
    }

    #[test]
    fn day_summary_missing_field_fails() {
        let json = DAY_SUMMARY.replace(r#""precipitation": {"total": 1.5},"#, "");
        assert!(serde_json::from_str::<OwmDaySummary>(&json).is_err());
    }

    #[test]
    fn current_rain_from_one_hour_amount() {
        let response: OwmCurrentResponse = serde_json::from_str(CURRENT_RAIN).unwrap();
        let current = convert_current(response);
        assert!(current.is_raining);
        assert_eq!(current.rain_intensity, 2.7);
        assert_eq!(current.condition, WeatherCondition::Rain);
        assert_eq!(current.description, "moderate rain");
        assert_eq!(current.location.as_deref(), Some("Budapest"));
    }

    #[test]
    fn drizzle_without_amount_is_raining() {
        let json = r#"{
            "weather": [{"id": 300, "main": "Drizzle", "description": "light drizzle"}],
            "main": {"temp": 15.0, "humidity": 90},
            "wind": {"speed": 1.0}, "clouds": {"all": 100}
        }"#;
        let current = convert_current(serde_json::from_str(json).unwrap());
        assert!(current.is_raining);
        assert_eq!(current.rain_intensity, 0.0);
    }

    #[test]
    fn clear_sky_is_dry() {
        let json = r#"{
            "weather": [{"id": 800, "main": "Clear", "description": "clear sky"}],
            "main": {"temp": 28.0, "humidity": 40},
            "wind": {"speed": 2.0}, "clouds": {"all": 0}, "name": ""
        }"#;
        let current = convert_current(serde_json::from_str(json).unwrap());
        assert!(!current.is_raining);
        assert!(current.location.is_none());
    }

    #[test]
    fn current_missing_humidity_fails() {
        let json = r#"{
            "weather": [], "main": {"temp": 28.0},
            "wind": {"speed": 2.0}, "clouds": {"all": 0}
        }"#;
        assert!(serde_json::from_str::<OwmCurrentResponse>(json).is_err());
    }

    #[test]
    fn forecast_groups_slots_by_utc_date() {
        // 2025-08-20 00:00 UTC
        let midnight = 1_755_648_000;
        let items = [
            forecast_item(midnight, 18.0, None, "clear sky"),
            forecast_item(midnight + 3 * 3600, 24.0, Some(1.5), "light rain"),
            forecast_item(midnight + 6 * 3600, 29.0, Some(0.5), "light rain"),
            forecast_item(midnight + 24 * 3600, 27.0, None, "clear sky"),
        ];
        let json = format!(r#"{{"list": [{}], "city": {{"name": "Budapest"}}}}"#, items.join(","));
        let response: OwmForecastResponse = serde_json::from_str(&json).unwrap();
        let days = aggregate_daily(&response.list);

        assert_eq!(days.len(), 2);
        let first = &days[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2025, 8, 20).unwrap());
        assert_eq!(first.temp_max, 29.0);
        assert_eq!(first.temp_min, 18.0);
        assert!((first.total_rain - 2.0).abs() < 1e-9);
        assert_eq!(first.rain_periods, 2);
        assert_eq!(first.humidity_avg, 60.0);
        assert_eq!(first.wind_max, 2.5);
        assert_eq!(first.descriptions, vec!["clear sky", "light rain"]);
        assert_eq!(days[1].total_rain, 0.0);
    }

    #[test]
    fn snow_counts_as_precipitation() {
        let json = r#"{"list": [{"dt": 1755648000, "main": {"temp": -1.0, "humidity": 80},
            "weather": [{"id": 600, "description": "light snow"}], "clouds": {"all": 100},
            "wind": {"speed": 1.0}, "snow": {"3h": 0.8}, "rain": {"3h": 0.2}}]}"#;
        let response: OwmForecastResponse = serde_json::from_str(json).unwrap();
        let days = aggregate_daily(&response.list);
        assert!((days[0].total_rain - 1.0).abs() < 1e-9);
    }
}
