use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Marks a payload that came from a substitute attempt rather than the
/// primary upstream, so the display can disclose it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provenance {
    pub source: String,
    pub note: String,
}

/// The single most recent successful fetch for one resource key.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Value,
    pub fetched_at: Instant,
    pub last_fetch: DateTime<Utc>,
    pub provenance: Option<Provenance>,
}

impl CacheEntry {
    pub fn new(payload: Value, provenance: Option<Provenance>) -> Self {
        Self {
            payload,
            fetched_at: Instant::now(),
            last_fetch: Utc::now(),
            provenance,
        }
    }

    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.fetched_at)
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }

    pub fn to_fresh_response(&self) -> CacheResponse {
        CacheResponse {
            payload: self.payload.clone(),
            cached: false,
            stale: false,
            cache_age: None,
            error: None,
            last_fetch: self.last_fetch,
            provenance: self.provenance.clone(),
        }
    }

    pub fn to_cached_response(&self) -> CacheResponse {
        CacheResponse {
            payload: self.payload.clone(),
            cached: true,
            stale: false,
            cache_age: Some(self.age()),
            error: None,
            last_fetch: self.last_fetch,
            provenance: self.provenance.clone(),
        }
    }

    pub fn to_stale_response(&self, error: String) -> CacheResponse {
        CacheResponse {
            payload: self.payload.clone(),
            cached: true,
            stale: true,
            cache_age: Some(self.age()),
            error: Some(error),
            last_fetch: self.last_fetch,
            provenance: self.provenance.clone(),
        }
    }
}

/// What `get` hands back to the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheResponse {
    pub payload: Value,
    pub cached: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub stale: bool,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_age_secs"
    )]
    pub cache_age: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub last_fetch: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

/// Diagnostic view of one slot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotStatus {
    pub key: String,
    pub ttl_secs: u64,
    pub cached: bool,
    pub fresh: bool,
    pub age_secs: Option<u64>,
    pub last_fetch: Option<DateTime<Utc>>,
    pub provenance: Option<Provenance>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn serialize_age_secs<S: Serializer>(age: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match age {
        Some(age) => serializer.serialize_u64(age.as_secs()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_age_follows_clock() {
        let entry = CacheEntry::new(json!({"aqi": 85}), None);
        tokio::time::advance(Duration::from_secs(600)).await;

        assert_eq!(entry.age(), Duration::from_secs(600));
        assert!(entry.is_fresh(Duration::from_secs(601)));
        assert!(!entry.is_fresh(Duration::from_secs(600)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_serializes_contract_fields() {
        let entry = CacheEntry::new(json!({"aqi": 85}), None);
        tokio::time::advance(Duration::from_secs(125)).await;

        let body = serde_json::to_value(entry.to_stale_response("HTTP 503".to_string())).unwrap();

        assert_eq!(body["payload"], json!({"aqi": 85}));
        assert_eq!(body["cached"], json!(true));
        assert_eq!(body["stale"], json!(true));
        assert_eq!(body["cacheAge"], json!(125));
        assert_eq!(body["error"], json!("HTTP 503"));
        assert!(body.get("lastFetch").is_some());
        assert!(body.get("provenance").is_none());
    }

    #[test]
    fn test_fresh_response_omits_optional_fields() {
        let entry = CacheEntry::new(json!({"aqi": 90}), None);
        let body = serde_json::to_value(entry.to_fresh_response()).unwrap();

        assert_eq!(body["cached"], json!(false));
        assert!(body.get("stale").is_none());
        assert!(body.get("cacheAge").is_none());
        assert!(body.get("error").is_none());
    }
}
