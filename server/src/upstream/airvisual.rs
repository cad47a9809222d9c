use super::types::{AirVisualCity, AirVisualEnvelope};
use super::{rejection, Upstream, UpstreamFuture};
use crate::config::CityQuery;
use crate::engine::UpstreamError;
use reqwest::header::CACHE_CONTROL;
use reqwest::{Client, StatusCode};
use serde_json::Value;

/// IQAir AirVisual `v2/city` client for one monitoring city.
pub struct AirVisualClient {
    client: Client,
    base_url: String,
    api_key: String,
    city: CityQuery,
}

impl AirVisualClient {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>, city: CityQuery) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            city,
        }
    }

    pub async fn get_city(&self) -> Result<Value, UpstreamError> {
        let response = self
            .client
            .get(&self.base_url)
            .header(CACHE_CONTROL, "no-store")
            .query(&[
                ("city", self.city.city.as_str()),
                ("state", self.city.state.as_str()),
                ("country", self.city.country.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        interpret_body(status, &body).map_err(|err| {
            tracing::warn!("AirVisual request for {} failed: {}", self.city.city, err);
            err
        })
    }
}

impl Upstream for AirVisualClient {
    fn fetch(&self) -> UpstreamFuture<'_> {
        Box::pin(self.get_city())
    }
}

/// Classifies an AirVisual reply and returns the raw body when it is a
/// well-formed `success` for a city.
pub fn interpret_body(status: StatusCode, body: &str) -> Result<Value, UpstreamError> {
    if !status.is_success() {
        let detail = serde_json::from_str::<AirVisualEnvelope>(body)
            .ok()
            .and_then(|envelope| envelope.message().map(str::to_string))
            .unwrap_or_else(|| body.to_string());
        return Err(rejection(status, &detail));
    }

    let value: Value = serde_json::from_str(body)?;
    let envelope = AirVisualEnvelope::deserialize_from(&value)?;

    if envelope.status != "success" {
        let message = envelope.message().unwrap_or("unknown error");
        return Err(UpstreamError::Rejected(format!("API returned error: {}", message)));
    }

    serde_json::from_value::<AirVisualCity>(envelope.data)
        .map_err(|e| UpstreamError::Malformed(format!("unexpected city shape: {}", e)))?;

    Ok(value)
}

impl AirVisualEnvelope {
    fn deserialize_from(value: &Value) -> Result<Self, UpstreamError> {
        serde_json::from_value(value.clone())
            .map_err(|e| UpstreamError::Malformed(format!("missing status envelope: {}", e)))
    }
}
