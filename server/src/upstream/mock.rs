use super::{Upstream, UpstreamFuture};
use crate::config::CityQuery;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

/// Stand-in air-quality source used when no IQAir key is configured.
///
/// Produces an AirVisual-shaped `success` body with a reading around AQI 85
/// so the display can be brought up and checked without credentials.
pub struct SampleAirQuality {
    city: CityQuery,
}

impl SampleAirQuality {
    pub fn new(city: CityQuery) -> Self {
        Self { city }
    }

    pub fn reading(&self) -> Value {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let aqi = 80 + fastrand::i64(0..=10); // Gentle drift so refreshes are visible

        json!({
            "status": "success",
            "data": {
                "city": self.city.city,
                "state": self.city.state,
                "country": self.city.country,
                "location": {"type": "Point", "coordinates": [100.3, 13.8]},
                "current": {
                    "pollution": {"ts": now, "aqius": aqi, "mainus": "p2", "aqicn": aqi, "maincn": "p2"},
                    "weather": {"ts": now, "tp": 28, "pr": 1013, "hu": 65, "ws": 3.2, "wd": 180, "ic": "01d"}
                }
            }
        })
    }
}

impl Upstream for SampleAirQuality {
    fn fetch(&self) -> UpstreamFuture<'_> {
        Box::pin(async move { Ok(self.reading()) })
    }
}
