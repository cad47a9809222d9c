pub mod airvisual;
pub mod mock;
pub mod openmeteo;
pub mod types;

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::UpstreamError;

pub const AIR_QUALITY_KEY: &str = "air-quality";
pub const WEATHER_KEY: &str = "weather";

pub type UpstreamFuture<'a> = BoxFuture<'a, Result<Value, UpstreamError>>;

/// A remote data source the engine can refresh a slot from.
pub trait Upstream: Send + Sync {
    fn fetch(&self) -> UpstreamFuture<'_>;
}

/// One entry of a resource's ordered upstream list.
#[derive(Clone)]
pub struct Attempt {
    pub label: String,
    pub note: Option<String>,
    pub upstream: Arc<dyn Upstream>,
}

impl Attempt {
    pub fn new(label: impl Into<String>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            label: label.into(),
            note: None,
            upstream,
        }
    }

    /// Disclosure shown when this attempt stands in for an earlier one.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl std::fmt::Debug for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attempt")
            .field("label", &self.label)
            .field("note", &self.note)
            .finish_non_exhaustive()
    }
}

pub fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(concat!("AirDisplay/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
}

/// Turns a non-2xx upstream reply into a rejection carrying a short reason.
pub fn rejection(status: StatusCode, detail: &str) -> UpstreamError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return UpstreamError::Rejected(format!("rate limited (HTTP {})", status.as_u16()));
    }

    let detail = detail.trim();
    if detail.is_empty() {
        UpstreamError::Rejected(format!("HTTP {}", status))
    } else {
        let short: String = detail.chars().take(200).collect();
        UpstreamError::Rejected(format!("HTTP {}: {}", status, short))
    }
}
