use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One historical day of weather, as summarised by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyWeatherObservation {
    pub date: NaiveDate,
    pub max_temperature: f64, // °C
    pub humidity: f64,        // %
    pub wind_speed: f64,      // m/s
    pub cloud_cover: f64,     // %
    pub precipitation: f64,   // mm
}

/// Instantaneous weather snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub cloud_cover: f64,
    pub is_raining: bool,
    pub rain_intensity: f64, // mm/h
    pub description: String,
    pub condition: WeatherCondition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Aggregated forecast for one future calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDaySummary {
    pub date: NaiveDate,
    pub total_rain: f64, // rain + snow, mm
    pub temp_max: f64,
    pub temp_min: f64,
    pub humidity_avg: f64,
    pub wind_max: f64,
    pub cloud_avg: f64,
    pub rain_periods: u32, // 3-hour slots with precipitation
    #[serde(default)]
    pub descriptions: Vec<String>,
}

/// Weather condition categories from OpenWeatherMap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum WeatherCondition {
    #[default]
    Clear,
    Clouds,
    Rain,
    Drizzle,
    Thunderstorm,
    Snow,
    Mist,
    Fog,
    Other,
}

impl WeatherCondition {
    pub fn from_owm_id(id: u32) -> Self {
        match id {
            200..=232 => WeatherCondition::Thunderstorm,
            300..=321 => WeatherCondition::Drizzle,
            500..=531 => WeatherCondition::Rain,
            600..=622 => WeatherCondition::Snow,
            701 => WeatherCondition::Mist,
            741 => WeatherCondition::Fog,
            800 => WeatherCondition::Clear,
            801..=804 => WeatherCondition::Clouds,
            _ => WeatherCondition::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherCondition::Clear => "Clear",
            WeatherCondition::Clouds => "Cloudy",
            WeatherCondition::Rain => "Rain",
            WeatherCondition::Drizzle => "Drizzle",
            WeatherCondition::Thunderstorm => "Thunderstorm",
            WeatherCondition::Snow => "Snow",
            WeatherCondition::Mist => "Mist",
            WeatherCondition::Fog => "Fog",
            WeatherCondition::Other => "Other",
        }
    }

    /// Liquid precipitation falling on the lawn. Snow does not count.
    pub fn is_rain(&self) -> bool {
        matches!(
            self,
            WeatherCondition::Rain | WeatherCondition::Drizzle | WeatherCondition::Thunderstorm
        )
    }
}

impl std::fmt::Display for WeatherCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rain summary of a multi-day forecast
#[derive(Debug, Clone, Serialize)]
pub struct RainOutlook {
    pub forecast_days: usize,
    pub daily_rain: Vec<DailyRain>,
    pub rainy_days: Vec<NaiveDate>,
    pub total_expected_rain: f64,
    pub heaviest_day: Option<DailyRain>,
    pub will_rain: bool,
    pub rainy_days_count: usize,
    pub dry_days_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyRain {
    pub date: NaiveDate,
    pub rain_mm: f64,
}

impl RainOutlook {
    pub fn from_forecast(days: &[ForecastDaySummary]) -> Self {
        let daily_rain: Vec<DailyRain> = days
            .iter()
            .map(|d| DailyRain {
                date: d.date,
                rain_mm: d.total_rain,
            })
            .collect();

        let rainy_days: Vec<NaiveDate> = daily_rain
            .iter()
            .filter(|d| d.rain_mm > 0.0)
            .map(|d| d.date)
            .collect();

        let heaviest_day = daily_rain
            .iter()
            .filter(|d| d.rain_mm > 0.0)
            .max_by(|a, b| {
                a.rain_mm
                    .partial_cmp(&b.rain_mm)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .copied();

        let rainy_days_count = rainy_days.len();

        Self {
            forecast_days: daily_rain.len(),
            total_expected_rain: daily_rain.iter().fold(0.0, |acc, d| acc + d.rain_mm),
            will_rain: rainy_days_count > 0,
            dry_days_count: daily_rain.len() - rainy_days_count,
            rainy_days_count,
            rainy_days,
            heaviest_day,
            daily_rain,
        }
    }
}

/// Intensity label used when printing daily rain amounts
pub fn rain_intensity_label(rain_mm: f64) -> &'static str {
    if rain_mm > 10.0 {
        "heavy rain"
    } else if rain_mm > 2.0 {
        "moderate rain"
    } else if rain_mm > 0.0 {
        "light rain"
    } else {
        "dry"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(date: &str, rain: f64) -> ForecastDaySummary {
        ForecastDaySummary {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            total_rain: rain,
            temp_max: 25.0,
            temp_min: 15.0,
            humidity_avg: 50.0,
            wind_max: 3.0,
            cloud_avg: 40.0,
            rain_periods: 0,
            descriptions: Vec::new(),
        }
    }

    #[test]
    fn weather_condition_from_owm_id() {
        assert_eq!(
            WeatherCondition::from_owm_id(211),
            WeatherCondition::Thunderstorm
        );
        assert_eq!(WeatherCondition::from_owm_id(310), WeatherCondition::Drizzle);
        assert_eq!(WeatherCondition::from_owm_id(501), WeatherCondition::Rain);
        assert_eq!(WeatherCondition::from_owm_id(800), WeatherCondition::Clear);
        assert_eq!(WeatherCondition::from_owm_id(803), WeatherCondition::Clouds);
        assert_eq!(WeatherCondition::from_owm_id(999), WeatherCondition::Other);
    }

    #[test]
    fn snow_is_not_rain() {
        assert!(WeatherCondition::Rain.is_rain());
        assert!(WeatherCondition::Drizzle.is_rain());
        assert!(WeatherCondition::Thunderstorm.is_rain());
        assert!(!WeatherCondition::Snow.is_rain());
        assert!(!WeatherCondition::Clouds.is_rain());
    }

    #[test]
    fn rain_outlook_summarises_days() {
        let days = vec![
            day("2025-08-24", 0.0),
            day("2025-08-25", 3.5),
            day("2025-08-26", 12.0),
            day("2025-08-27", 0.0),
        ];
        let outlook = RainOutlook::from_forecast(&days);

        assert_eq!(outlook.forecast_days, 4);
        assert!(outlook.will_rain);
        assert_eq!(outlook.rainy_days_count, 2);
        assert_eq!(outlook.dry_days_count, 2);
        assert!((outlook.total_expected_rain - 15.5).abs() < 1e-9);
        let heaviest = outlook.heaviest_day.unwrap();
        assert_eq!(heaviest.date, days[2].date);
    }

    #[test]
    fn rain_outlook_dry_forecast() {
        let outlook = RainOutlook::from_forecast(&[day("2025-08-24", 0.0)]);
        assert!(!outlook.will_rain);
        assert!(outlook.heaviest_day.is_none());
        assert!(outlook.rainy_days.is_empty());
    }

    #[test]
    fn rain_intensity_labels() {
        assert_eq!(rain_intensity_label(0.0), "dry");
        assert_eq!(rain_intensity_label(1.0), "light rain");
        assert_eq!(rain_intensity_label(5.0), "moderate rain");
        assert_eq!(rain_intensity_label(10.5), "heavy rain");
    }
}
