use thiserror::Error;

/// Why a single upstream attempt failed.
///
/// These are recoverable: the engine logs them and degrades to a stale entry
/// when one exists. They are `Clone` because one refresh result is handed to
/// every coalesced caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("upstream unreachable: {0}")]
    Unreachable(String),
    #[error("upstream rejected request: {0}")]
    Rejected(String),
    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            UpstreamError::Malformed(err.to_string())
        } else if err.is_status() {
            UpstreamError::Rejected(err.to_string())
        } else {
            // timeouts, connect failures, broken bodies
            UpstreamError::Unreachable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for UpstreamError {
    fn from(err: serde_json::Error) -> Self {
        UpstreamError::Malformed(err.to_string())
    }
}

/// Failures surfaced to callers of the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("no data available for `{key}`: {cause}")]
    NoDataAvailable { key: String, cause: UpstreamError },
    #[error("unknown resource `{0}`")]
    UnknownResource(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum BuildError {
    #[error("resource `{0}` registered twice")]
    DuplicateResource(String),
    #[error("resource `{0}` has no upstream attempts")]
    NoUpstream(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_data_message_names_key_and_cause() {
        let err = FetchError::NoDataAvailable {
            key: "weather".to_string(),
            cause: UpstreamError::Rejected("HTTP 500".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "no data available for `weather`: upstream rejected request: HTTP 500"
        );
    }

    #[test]
    fn test_json_error_is_malformed() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(UpstreamError::from(err), UpstreamError::Malformed(_)));
    }
}
