//! HTTP error classification shared by the API clients.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{service} API error {status}: {body}")]
    Status {
        service: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} returned an unreadable body: {source}")]
    Decode {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    /// Rate limits, server errors and network failures are worth retrying;
    /// any other client error is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            ApiError::Transport { .. } => true,
            ApiError::Decode { .. } => false,
        }
    }
}

/// Turn a response into JSON, or an [`ApiError::Status`] for non-2xx codes.
/// A 2xx body that is not JSON is an [`ApiError::Decode`].
pub async fn json_or_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<serde_json::Value, ApiError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|source| ApiError::Decode { service, source });
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        service,
        status,
        body,
    })
}

/// Exponential backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        let err = |code: u16| ApiError::Status {
            service: "test",
            status: StatusCode::from_u16(code).unwrap(),
            body: String::new(),
        };
        assert!(err(429).is_retryable());
        assert!(err(500).is_retryable());
        assert!(err(503).is_retryable());
        assert!(!err(400).is_retryable());
        assert!(!err(401).is_retryable());
        assert!(!err(404).is_retryable());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(4), Duration::from_secs(8));
        assert_eq!(backoff_delay(6), Duration::from_secs(32));
        assert_eq!(backoff_delay(20), Duration::from_secs(32));
    }
}
