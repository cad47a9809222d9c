use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// US EPA AQI band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AqiLevel {
    Unknown,
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiLevel {
    pub fn from_aqi(aqi: i64) -> Self {
        match aqi {
            i64::MIN..=0 => AqiLevel::Unknown,
            1..=50 => AqiLevel::Good,
            51..=100 => AqiLevel::Moderate,
            101..=150 => AqiLevel::UnhealthyForSensitiveGroups,
            151..=200 => AqiLevel::Unhealthy,
            201..=300 => AqiLevel::VeryUnhealthy,
            _ => AqiLevel::Hazardous,
        }
    }
}

struct Breakpoint {
    aqi_low: i64,
    aqi_high: i64,
    pm25_low: f64,
    pm25_high: f64,
}

const PM25_BREAKPOINTS: [Breakpoint; 7] = [
    Breakpoint { aqi_low: 0, aqi_high: 50, pm25_low: 0.0, pm25_high: 12.0 },
    Breakpoint { aqi_low: 51, aqi_high: 100, pm25_low: 12.1, pm25_high: 35.4 },
    Breakpoint { aqi_low: 101, aqi_high: 150, pm25_low: 35.5, pm25_high: 55.4 },
    Breakpoint { aqi_low: 151, aqi_high: 200, pm25_low: 55.5, pm25_high: 150.4 },
    Breakpoint { aqi_low: 201, aqi_high: 300, pm25_low: 150.5, pm25_high: 250.4 },
    Breakpoint { aqi_low: 301, aqi_high: 400, pm25_low: 250.5, pm25_high: 350.4 },
    Breakpoint { aqi_low: 401, aqi_high: 500, pm25_low: 350.5, pm25_high: 500.4 },
];

/// Estimate the PM2.5 concentration (µg/m³) behind a US AQI value
pub fn pm25_from_aqi(aqi: i64) -> Option<f64> {
    PM25_BREAKPOINTS
        .iter()
        .find(|b| (b.aqi_low..=b.aqi_high).contains(&aqi))
        .map(|b| {
            let fraction = (aqi - b.aqi_low) as f64 / (b.aqi_high - b.aqi_low) as f64;
            round_to_decimals(b.pm25_low + fraction * (b.pm25_high - b.pm25_low), 1)
        })
}

/// Convert wind speed from m/s to km/h
pub fn ms_to_kmh(ms: f64) -> f64 {
    ms * 3.6
}

/// Station wind speed (m/s) as display km/h with one decimal
pub fn format_wind_speed(ms: f64) -> f64 {
    if !ms.is_finite() || ms < 0.0 {
        return 0.0;
    }
    round_to_decimals(ms_to_kmh(ms), 1)
}

/// 8-point compass name for a bearing in degrees
pub fn angle_to_cardinal(degrees: f64) -> &'static str {
    const DIRECTIONS: [&str; 8] = [
        "North",
        "Northeast",
        "East",
        "Southeast",
        "South",
        "Southwest",
        "West",
        "Northwest",
    ];

    if !degrees.is_finite() {
        return DIRECTIONS[0];
    }
    let normalized = degrees.rem_euclid(360.0);
    let index = ((normalized + 22.5) / 45.0) as usize % DIRECTIONS.len();
    DIRECTIONS[index]
}

/// Round to specified decimal places
pub fn round_to_decimals(value: f64, decimals: u32) -> f64 {
    let multiplier = 10_f64.powi(decimals as i32);
    (value * multiplier).round() / multiplier
}

/// Parse timezone string and validate
pub fn parse_timezone(tz_str: &str) -> Result<chrono_tz::Tz, String> {
    tz_str.parse::<chrono_tz::Tz>()
        .map_err(|_| format!("Invalid timezone: {}", tz_str))
}

/// Convert UTC time to local timezone
pub fn utc_to_local(utc_time: DateTime<Utc>, timezone: &str) -> Result<DateTime<chrono_tz::Tz>, String> {
    let tz = parse_timezone(timezone)?;
    Ok(utc_time.with_timezone(&tz))
}

/// Server clock as the display shows it: RFC 3339 with milliseconds and the
/// local offset
pub fn format_server_time(utc_time: DateTime<Utc>, timezone: &str) -> Result<String, String> {
    Ok(utc_to_local(utc_time, timezone)?.to_rfc3339_opts(SecondsFormat::Millis, false))
}

/// Error response helper
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            code: code.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_aqi_levels() {
        assert_eq!(AqiLevel::from_aqi(0), AqiLevel::Unknown);
        assert_eq!(AqiLevel::from_aqi(-5), AqiLevel::Unknown);
        assert_eq!(AqiLevel::from_aqi(50), AqiLevel::Good);
        assert_eq!(AqiLevel::from_aqi(51), AqiLevel::Moderate);
        assert_eq!(AqiLevel::from_aqi(150), AqiLevel::UnhealthyForSensitiveGroups);
        assert_eq!(AqiLevel::from_aqi(200), AqiLevel::Unhealthy);
        assert_eq!(AqiLevel::from_aqi(300), AqiLevel::VeryUnhealthy);
        assert_eq!(AqiLevel::from_aqi(301), AqiLevel::Hazardous);
    }

    #[test]
    fn test_pm25_from_aqi() {
        assert_eq!(pm25_from_aqi(0), Some(0.0));
        assert_eq!(pm25_from_aqi(50), Some(12.0));
        assert_eq!(pm25_from_aqi(100), Some(35.4));
        assert_eq!(pm25_from_aqi(500), Some(500.4));
        assert_eq!(pm25_from_aqi(501), None);
        assert_eq!(pm25_from_aqi(-1), None);

        let moderate = pm25_from_aqi(85).unwrap();
        assert!(moderate > 12.1 && moderate < 35.4);
    }

    #[test]
    fn test_format_wind_speed() {
        assert_eq!(format_wind_speed(3.2), 11.5);
        assert_eq!(format_wind_speed(0.0), 0.0);
        assert_eq!(format_wind_speed(-2.0), 0.0);
        assert_eq!(format_wind_speed(f64::NAN), 0.0);
    }

    #[test]
    fn test_angle_to_cardinal() {
        assert_eq!(angle_to_cardinal(0.0), "North");
        assert_eq!(angle_to_cardinal(22.4), "North");
        assert_eq!(angle_to_cardinal(22.5), "Northeast");
        assert_eq!(angle_to_cardinal(180.0), "South");
        assert_eq!(angle_to_cardinal(350.0), "North");
        assert_eq!(angle_to_cardinal(-90.0), "West");
        assert_eq!(angle_to_cardinal(405.0), "Northeast");
    }

    #[test]
    fn test_round_to_decimals() {
        assert_eq!(round_to_decimals(3.14159, 2), 3.14);
        assert_eq!(round_to_decimals(11.52, 1), 11.5);
    }

    #[test]
    fn test_server_time_in_bangkok() {
        let utc = Utc.with_ymd_and_hms(2025, 1, 10, 4, 30, 0).unwrap();
        let formatted = format_server_time(utc, "Asia/Bangkok").unwrap();
        assert_eq!(formatted, "2025-01-10T11:30:00.000+07:00");
    }

    #[test]
    fn test_invalid_timezone() {
        assert!(parse_timezone("Mars/Olympus").is_err());
        assert!(format_server_time(Utc::now(), "Mars/Olympus").is_err());
    }
}
