use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileJumpError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api {
        status: StatusCode,
        body: String,
        www_authenticate: Option<String>,
        retry_after: Option<Duration>,
    },
    #[error("failed to decode response: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("{operation} failed: api status {status:?}")]
    Status {
        operation: &'static str,
        status: String,
    },
    #[error("redirect response without a location header")]
    MissingRedirectLocation,
    #[error("invalid entry id {0:?}")]
    InvalidId(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("operation cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    /// 401 whose challenge says the bearer token expired.
    ExpiredToken,
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

/// Status codes retried regardless of the body.
pub const RETRY_STATUS_CODES: [u16; 6] = [429, 500, 502, 503, 504, 509];

impl FileJumpError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            FileJumpError::Api {
                status,
                www_authenticate,
                ..
            } => Some(classify_api_status(*status, www_authenticate.as_deref())),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            FileJumpError::Request(err) => is_retryable_transport(err),
            FileJumpError::Decode { .. } => true,
            FileJumpError::Api { .. } => matches!(
                self.classification(),
                Some(ApiErrorClass::ExpiredToken | ApiErrorClass::RateLimit | ApiErrorClass::Transient)
            ),
            _ => false,
        }
    }

    /// Delay requested by the server through `Retry-After`, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FileJumpError::Api { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FileJumpError::Api { status, .. } => Some(*status),
            FileJumpError::Request(err) => err.status(),
            _ => None,
        }
    }
}

fn is_retryable_transport(err: &reqwest::Error) -> bool {
    if let Some(status) = err.status() {
        return RETRY_STATUS_CODES.contains(&status.as_u16());
    }
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

fn classify_api_status(status: StatusCode, www_authenticate: Option<&str>) -> ApiErrorClass {
    if status == StatusCode::UNAUTHORIZED {
        if www_authenticate.is_some_and(|value| value.contains("expired_token")) {
            ApiErrorClass::ExpiredToken
        } else {
            ApiErrorClass::Auth
        }
    } else if status == StatusCode::FORBIDDEN {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if RETRY_STATUS_CODES.contains(&status.as_u16()) {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(status: u16, challenge: Option<&str>) -> FileJumpError {
        FileJumpError::Api {
            status: StatusCode::from_u16(status).unwrap(),
            body: String::new(),
            www_authenticate: challenge.map(str::to_string),
            retry_after: None,
        }
    }

    #[test]
    fn retries_listed_status_codes() {
        for code in RETRY_STATUS_CODES {
            assert!(api_error(code, None).is_retryable(), "{code} should retry");
        }
        assert!(!api_error(400, None).is_retryable());
        assert!(!api_error(404, None).is_retryable());
        assert!(!api_error(501, None).is_retryable());
    }

    #[test]
    fn unauthorized_retries_only_on_expired_token() {
        let expired = api_error(
            401,
            Some(r#"Bearer realm="api", error="invalid_token", error_description="expired_token""#),
        );
        assert_eq!(expired.classification(), Some(ApiErrorClass::ExpiredToken));
        assert!(expired.is_retryable());

        let plain = api_error(401, Some(r#"Bearer realm="api""#));
        assert_eq!(plain.classification(), Some(ApiErrorClass::Auth));
        assert!(!plain.is_retryable());
        assert!(!api_error(401, None).is_retryable());
    }

    #[test]
    fn decode_failures_are_retryable() {
        let source = serde_json::from_str::<serde_json::Value>("<html>").unwrap_err();
        let err = FileJumpError::Decode {
            source,
            body: "<html>".into(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn status_and_cancellation_are_not_retryable() {
        let status = FileJumpError::Status {
            operation: "delete",
            status: "error".into(),
        };
        assert!(!status.is_retryable());
        assert!(!FileJumpError::Cancelled.is_retryable());
    }
}
