use serde::{Deserialize, Serialize};
use serde_json::Value;

// AirVisual `v2/city`

#[derive(Debug, Clone, Deserialize)]
pub struct AirVisualEnvelope {
    pub status: String,
    #[serde(default)]
    pub data: Value,
}

impl AirVisualEnvelope {
    /// Error bodies look like `{"status":"fail","data":{"message":"city_not_found"}}`.
    pub fn message(&self) -> Option<&str> {
        self.data.get("message").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirVisualCity {
    pub city: String,
    pub state: String,
    pub country: String,
    pub location: Option<GeoPoint>,
    pub current: StationCurrent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationCurrent {
    pub pollution: Pollution,
    pub weather: Option<StationWeather>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pollution {
    pub ts: String,
    pub aqius: f64,
    pub mainus: String,
    pub aqicn: Option<f64>,
    pub maincn: Option<String>,
}

/// Station weather readings; any of them can be missing or out of range.
///
/// `tp`, `pr` and `hu` stay untyped so a garbled reading reaches the
/// plausibility rules instead of failing the whole fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationWeather {
    pub ts: Option<String>,
    pub tp: Option<Value>,
    pub pr: Option<Value>,
    pub hu: Option<Value>,
    pub ws: Option<f64>,
    pub wd: Option<f64>,
    pub ic: Option<String>,
}

// Open-Meteo `v1/forecast`

#[derive(Debug, Deserialize)]
pub struct OpenMeteoResponse {
    pub current: OpenMeteoCurrent,
    pub hourly: OpenMeteoHourly,
    pub daily: OpenMeteoDaily,
}

#[derive(Debug, Deserialize)]
pub struct OpenMeteoCurrent {
    // Checked by the weather plausibility rules, not here
    #[serde(default)]
    pub temperature_2m: Value,
    #[serde(default)]
    pub relative_humidity_2m: Value,
    pub precipitation: f64,
    pub weather_code: u8,
    pub wind_speed_10m: f64,
    pub wind_direction_10m: f64,
}

#[derive(Debug, Deserialize)]
pub struct OpenMeteoHourly {
    pub time: Vec<String>,
    pub precipitation: Vec<Option<f64>>,
    pub precipitation_probability: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
pub struct OpenMeteoDaily {
    pub temperature_2m_min: Vec<f64>,
    pub temperature_2m_max: Vec<f64>,
}

// Normalized weather payload served to the display

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherReport {
    pub status: String,
    pub location: SiteInfo,
    pub current: CurrentConditions,
    pub daily: DailyRange,
    pub hourly: HourlyOutlook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteInfo {
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentConditions {
    pub temperature: Value,
    pub humidity: Value,
    pub precipitation: f64,
    pub weather_code: u8,
    pub condition: WeatherCondition,
    /// km/h, as reported by Open-Meteo
    pub wind_speed: f64,
    pub wind_direction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRange {
    pub temp_min: f64,
    pub temp_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyOutlook {
    pub time: Vec<String>,
    pub precipitation: Vec<Option<f64>>,
    pub precipitation_probability: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeatherCondition {
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    Showers,
    Snow,
    Thunderstorm,
}
