use anyhow::Context;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::utils::parse_timezone;

/// City/state/country triple identifying an AirVisual monitoring city.
#[derive(Clone, Debug, PartialEq)]
pub struct CityQuery {
    pub city: String,
    pub state: String,
    pub country: String,
}

/// The place the display stands, used for the weather forecast.
#[derive(Clone, Debug, PartialEq)]
pub struct SiteLocation {
    pub name: String,
    pub state: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TemperatureBounds {
    pub min: f64,
    pub max: f64,
    pub fallback: f64,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub app_timezone: String,

    pub iqair_key: Option<String>,
    pub airvisual_base_url: String,
    pub aqi_primary: CityQuery,
    pub aqi_secondary: Option<CityQuery>,
    pub air_quality_ttl: Duration,
    pub air_quality_timeout: Duration,
    pub air_quality_poll: Duration,
    pub station_temperature: TemperatureBounds,

    pub open_meteo_base_url: String,
    pub site: SiteLocation,
    pub weather_ttl: Duration,
    pub weather_timeout: Duration,
    pub weather_poll: Duration,

    pub prefetch_enabled: bool,
    pub allow_forced_refresh: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| -> String {
            lookup(key).unwrap_or_else(|| default.to_string())
        };

        let state = text("AQI_STATE", "Nakhon-pathom");
        let country = text("AQI_COUNTRY", "Thailand");
        let secondary_city = text("AQI_SECONDARY_CITY", "Nakhon-pathom");

        let host = text("BIND_HOST", "0.0.0.0");
        let port: u16 = parsed(&lookup, "PORT", 3000)?;

        let app_timezone = text("APP_TIMEZONE", "Asia/Bangkok");
        parse_timezone(&app_timezone)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("APP_TIMEZONE has an invalid value: {:?}", app_timezone))?;

        Ok(Config {
            bind_addr: format!("{}:{}", host, port),
            app_timezone,

            iqair_key: lookup("IQAIR_KEY").filter(|key| !key.trim().is_empty()),
            airvisual_base_url: text("AIRVISUAL_BASE_URL", "https://api.airvisual.com/v2/city"),
            aqi_primary: CityQuery {
                city: text("AQI_PRIMARY_CITY", "Salaya"),
                state: state.clone(),
                country: country.clone(),
            },
            aqi_secondary: (!secondary_city.trim().is_empty()).then(|| CityQuery {
                city: secondary_city,
                state,
                country,
            }),
            air_quality_ttl: seconds(&lookup, "AIR_QUALITY_TTL_SECS", 30 * 60)?,
            air_quality_timeout: seconds(&lookup, "AIR_QUALITY_TIMEOUT_SECS", 30)?,
            air_quality_poll: seconds(&lookup, "AIR_QUALITY_POLL_SECS", 60)?,
            station_temperature: TemperatureBounds {
                min: parsed(&lookup, "STATION_TEMP_MIN", -10.0)?,
                max: parsed(&lookup, "STATION_TEMP_MAX", 50.0)?,
                fallback: parsed(&lookup, "STATION_TEMP_FALLBACK", 28.0)?,
            },

            open_meteo_base_url: text("OPEN_METEO_BASE_URL", "https://api.open-meteo.com/v1/forecast"),
            site: SiteLocation {
                name: text("SITE_NAME", "Salaya"),
                state: text("SITE_STATE", "Nakhon Pathom"),
                latitude: parsed(&lookup, "SITE_LATITUDE", 13.796)?,
                longitude: parsed(&lookup, "SITE_LONGITUDE", 100.326)?,
            },
            weather_ttl: seconds(&lookup, "WEATHER_TTL_SECS", 15 * 60)?,
            weather_timeout: seconds(&lookup, "WEATHER_TIMEOUT_SECS", 15)?,
            weather_poll: seconds(&lookup, "WEATHER_POLL_SECS", 5 * 60)?,

            prefetch_enabled: parsed(&lookup, "PREFETCH_ENABLED", true)?,
            allow_forced_refresh: parsed(&lookup, "ALLOW_FORCED_REFRESH", false)?,
        })
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

fn seconds<F>(lookup: &F, key: &str, default: u64) -> anyhow::Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: u64 = parsed(lookup, key, default)?;
    if secs == 0 {
        anyhow::bail!("{} must be greater than zero", key);
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.app_timezone, "Asia/Bangkok");
        assert!(config.iqair_key.is_none());
        assert_eq!(config.aqi_primary.city, "Salaya");
        assert_eq!(config.aqi_secondary.as_ref().map(|c| c.city.as_str()), Some("Nakhon-pathom"));
        assert_eq!(config.air_quality_ttl, Duration::from_secs(1800));
        assert_eq!(config.air_quality_timeout, Duration::from_secs(30));
        assert_eq!(config.weather_ttl, Duration::from_secs(900));
        assert_eq!(config.weather_timeout, Duration::from_secs(15));
        assert_eq!(config.station_temperature.fallback, 28.0);
        assert!(config.prefetch_enabled);
        assert!(!config.allow_forced_refresh);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("IQAIR_KEY", "abc123"),
            ("AIR_QUALITY_TTL_SECS", "900"),
            ("AQI_SECONDARY_CITY", ""),
            ("SITE_LATITUDE", "18.79"),
            ("PREFETCH_ENABLED", "false"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.iqair_key.as_deref(), Some("abc123"));
        assert_eq!(config.air_quality_ttl, Duration::from_secs(900));
        assert!(config.aqi_secondary.is_none());
        assert!((config.site.latitude - 18.79).abs() < 1e-9);
        assert!(!config.prefetch_enabled);
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let config = config_from(&[("IQAIR_KEY", "  ")]).unwrap();
        assert!(config.iqair_key.is_none());
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = config_from(&[("WEATHER_TTL_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("WEATHER_TTL_SECS"));
    }

    #[test]
    fn test_unknown_timezone_is_rejected() {
        let err = config_from(&[("APP_TIMEZONE", "Asia/Atlantis")]).unwrap_err();
        assert!(err.to_string().contains("APP_TIMEZONE"));

        let config = config_from(&[("APP_TIMEZONE", "Asia/Tokyo")]).unwrap();
        assert_eq!(config.app_timezone, "Asia/Tokyo");
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        assert!(config_from(&[("AIR_QUALITY_TTL_SECS", "0")]).is_err());
    }
}
