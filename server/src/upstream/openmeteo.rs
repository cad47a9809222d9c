//! Open-Meteo forecast client.
//!
//! Fetches current conditions, today's temperature range and the next few
//! hours of precipitation for the display site, and normalizes them into a
//! [`WeatherReport`].

use super::types::*;
use super::{rejection, Upstream, UpstreamFuture};
use crate::config::SiteLocation;
use crate::engine::UpstreamError;
use reqwest::header::CACHE_CONTROL;
use reqwest::Client;
use serde_json::Value;

const CURRENT_FIELDS: &str =
    "temperature_2m,relative_humidity_2m,precipitation,weather_code,wind_speed_10m,wind_direction_10m";
const HOURLY_FIELDS: &str = "precipitation_probability,precipitation";
const DAILY_FIELDS: &str = "temperature_2m_min,temperature_2m_max";

/// Number of upcoming hours kept in the precipitation outlook
const OUTLOOK_HOURS: usize = 6;

pub struct OpenMeteoClient {
    client: Client,
    base_url: String,
    site: SiteLocation,
    timezone: String,
}

impl OpenMeteoClient {
    pub fn new(client: Client, base_url: impl Into<String>, site: SiteLocation, timezone: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            site,
            timezone: timezone.into(),
        }
    }

    pub async fn get_forecast(&self) -> Result<Value, UpstreamError> {
        let latitude = self.site.latitude.to_string();
        let longitude = self.site.longitude.to_string();

        let response = self
            .client
            .get(&self.base_url)
            .header(CACHE_CONTROL, "no-store")
            .query(&[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("current", CURRENT_FIELDS),
                ("hourly", HOURLY_FIELDS),
                ("daily", DAILY_FIELDS),
                ("timezone", self.timezone.as_str()),
                ("forecast_days", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(rejection(status, &body));
        }

        let forecast: OpenMeteoResponse = serde_json::from_str(&body)?;
        let report = normalize(forecast, &self.site)?;
        Ok(serde_json::to_value(report)?)
    }
}

impl Upstream for OpenMeteoClient {
    fn fetch(&self) -> UpstreamFuture<'_> {
        Box::pin(self.get_forecast())
    }
}

pub fn normalize(forecast: OpenMeteoResponse, site: &SiteLocation) -> Result<WeatherReport, UpstreamError> {
    let current = forecast.current;
    let daily = forecast.daily;
    let hourly = forecast.hourly;

    let temp_min = daily
        .temperature_2m_min
        .first()
        .copied()
        .ok_or_else(|| UpstreamError::Malformed("daily.temperature_2m_min is empty".to_string()))?;
    let temp_max = daily
        .temperature_2m_max
        .first()
        .copied()
        .ok_or_else(|| UpstreamError::Malformed("daily.temperature_2m_max is empty".to_string()))?;

    Ok(WeatherReport {
        status: "success".to_string(),
        location: SiteInfo {
            latitude: site.latitude,
            longitude: site.longitude,
            name: site.name.clone(),
            state: site.state.clone(),
        },
        current: CurrentConditions {
            temperature: current.temperature_2m,
            humidity: current.relative_humidity_2m,
            precipitation: current.precipitation,
            weather_code: current.weather_code,
            condition: weather_code_to_condition(current.weather_code),
            wind_speed: current.wind_speed_10m,
            wind_direction: current.wind_direction_10m,
        },
        daily: DailyRange { temp_min, temp_max },
        hourly: HourlyOutlook {
            time: hourly.time.into_iter().take(OUTLOOK_HOURS).collect(),
            precipitation: hourly.precipitation.into_iter().take(OUTLOOK_HOURS).collect(),
            precipitation_probability: hourly
                .precipitation_probability
                .into_iter()
                .take(OUTLOOK_HOURS)
                .collect(),
        },
    })
}

/// Map a WMO weather code to a coarse condition
///
/// - 0: clear sky
/// - 1-3: mainly clear to partly cloudy
/// - 45, 48: fog
/// - 51-57: drizzle
/// - 61-67: rain
/// - 71-77, 85-86: snow
/// - 80-82: rain showers
/// - 95-99: thunderstorm
pub fn weather_code_to_condition(code: u8) -> WeatherCondition {
    match code {
        0 => WeatherCondition::Clear,
        1..=3 => WeatherCondition::PartlyCloudy,
        45 | 48 => WeatherCondition::Fog,
        51..=57 => WeatherCondition::Drizzle,
        61..=67 => WeatherCondition::Rain,
        71..=77 | 85..=86 => WeatherCondition::Snow,
        80..=82 => WeatherCondition::Showers,
        95..=99 => WeatherCondition::Thunderstorm,
        _ => WeatherCondition::Cloudy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FORECAST: &str = r#"{
        "latitude": 13.8,
        "longitude": 100.32,
        "timezone": "Asia/Bangkok",
        "current": {
            "time": "2025-01-10T11:00",
            "interval": 900,
            "temperature_2m": 31.4,
            "relative_humidity_2m": 58,
            "precipitation": 0.0,
            "weather_code": 2,
            "wind_speed_10m": 9.7,
            "wind_direction_10m": 135
        },
        "hourly": {
            "time": ["2025-01-10T00:00", "2025-01-10T01:00", "2025-01-10T02:00", "2025-01-10T03:00",
                     "2025-01-10T04:00", "2025-01-10T05:00", "2025-01-10T06:00", "2025-01-10T07:00"],
            "precipitation_probability": [0, 0, 5, 10, 20, null, 40, 50],
            "precipitation": [0.0, 0.0, 0.0, 0.1, 0.3, 0.0, 1.2, 2.0]
        },
        "daily": {
            "time": ["2025-01-10"],
            "temperature_2m_min": [23.1],
            "temperature_2m_max": [33.8]
        }
    }"#;

    fn site() -> SiteLocation {
        SiteLocation {
            name: "Salaya".to_string(),
            state: "Nakhon Pathom".to_string(),
            latitude: 13.796,
            longitude: 100.326,
        }
    }

    #[test]
    fn test_normalize_forecast() {
        let forecast: OpenMeteoResponse = serde_json::from_str(FORECAST).expect("valid forecast");
        let report = normalize(forecast, &site()).expect("normalized report");

        assert_eq!(report.status, "success");
        assert_eq!(report.location.name, "Salaya");
        assert_eq!(report.current.temperature, json!(31.4));
        assert_eq!(report.current.condition, WeatherCondition::PartlyCloudy);
        assert!((report.daily.temp_min - 23.1).abs() < 0.01);
        assert!((report.daily.temp_max - 33.8).abs() < 0.01);
        assert_eq!(report.hourly.time.len(), OUTLOOK_HOURS);
        assert_eq!(report.hourly.precipitation_probability[5], None);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let forecast: OpenMeteoResponse = serde_json::from_str(FORECAST).unwrap();
        let value = serde_json::to_value(normalize(forecast, &site()).unwrap()).unwrap();

        assert_eq!(value["current"]["weatherCode"], json!(2));
        assert_eq!(value["current"]["condition"], json!("partly-cloudy"));
        assert_eq!(value["current"]["windDirection"], json!(135.0));
        assert_eq!(value["daily"]["tempMax"], json!(33.8));
        assert!(value["hourly"]["precipitationProbability"].is_array());
    }

    #[test]
    fn test_empty_daily_is_malformed() {
        let mut raw: Value = serde_json::from_str(FORECAST).unwrap();
        raw["daily"]["temperature_2m_min"] = json!([]);
        let forecast: OpenMeteoResponse = serde_json::from_value(raw).unwrap();

        let err = normalize(forecast, &site()).unwrap_err();
        assert!(matches!(err, UpstreamError::Malformed(_)));
    }

    #[test]
    fn test_null_temperature_is_passed_through() {
        let mut raw: Value = serde_json::from_str(FORECAST).unwrap();
        raw["current"]["temperature_2m"] = Value::Null;
        let forecast: OpenMeteoResponse = serde_json::from_value(raw).unwrap();

        let report = normalize(forecast, &site()).unwrap();
        assert_eq!(report.current.temperature, Value::Null);
        assert_eq!(report.current.humidity, json!(58));
    }

    #[test]
    fn test_weather_code_mapping() {
        assert_eq!(weather_code_to_condition(0), WeatherCondition::Clear);
        assert_eq!(weather_code_to_condition(3), WeatherCondition::PartlyCloudy);
        assert_eq!(weather_code_to_condition(48), WeatherCondition::Fog);
        assert_eq!(weather_code_to_condition(53), WeatherCondition::Drizzle);
        assert_eq!(weather_code_to_condition(63), WeatherCondition::Rain);
        assert_eq!(weather_code_to_condition(81), WeatherCondition::Showers);
        assert_eq!(weather_code_to_condition(86), WeatherCondition::Snow);
        assert_eq!(weather_code_to_condition(96), WeatherCondition::Thunderstorm);
        assert_eq!(weather_code_to_condition(200), WeatherCondition::Cloudy);
    }
}
