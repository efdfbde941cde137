//! Errors raised by language-model providers

use thiserror::Error;

pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LlmError {
    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    #[error("rate limited: {message}")]
    RateLimited { message: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("server error ({status}): {message}")]
    ServerError { message: String, status: u16 },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("malformed response: {message}")]
    MalformedResponse { message: String },

    #[error("provider call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("missing API key for {provider}")]
    MissingApiKey { provider: String },

    #[error("{message}")]
    Other { message: String },
}

impl LlmError {
    /// Whether a later attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. }
                | LlmError::ServerError { .. }
                | LlmError::Network { .. }
                | LlmError::Timeout { .. }
        )
    }
}

/// Map an HTTP failure onto an error variant
pub fn parse_http_error(status: u16, body: &str, provider: &str) -> LlmError {
    match status {
        401 => LlmError::AuthenticationFailed {
            message: format!("{}: invalid API key", provider),
        },
        403 => LlmError::AuthenticationFailed {
            message: format!("{}: access denied", provider),
        },
        404 => LlmError::ModelNotFound {
            model: body.to_string(),
        },
        429 => LlmError::RateLimited {
            message: body.to_string(),
        },
        400 | 422 => LlmError::InvalidRequest {
            message: body.to_string(),
        },
        500..=599 => LlmError::ServerError {
            message: body.to_string(),
            status,
        },
        _ => LlmError::Other {
            message: format!("HTTP {}: {}", status, body),
        },
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LlmError::MalformedResponse {
                message: err.to_string(),
            }
        } else {
            LlmError::Network {
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        match parse_http_error(401, "nope", "openai") {
            LlmError::AuthenticationFailed { message } => assert!(message.starts_with("openai")),
            other => panic!("Expected auth failure, got {:?}", other),
        }
        assert_eq!(
            parse_http_error(503, "overloaded", "openai"),
            LlmError::ServerError {
                message: "overloaded".to_string(),
                status: 503
            }
        );
        assert!(matches!(parse_http_error(429, "", "x"), LlmError::RateLimited { .. }));
        assert_eq!(
            parse_http_error(418, "teapot", "x").to_string(),
            "HTTP 418: teapot"
        );
    }

    #[test]
    fn test_transient_errors() {
        assert!(LlmError::Timeout { secs: 5 }.is_transient());
        assert!(!LlmError::InvalidRequest {
            message: String::new()
        }
        .is_transient());
    }
}
