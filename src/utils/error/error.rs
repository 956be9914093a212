use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use thiserror::Error;

/// Crate-wide error type.
///
/// Variant set follows spec section 7 one-for-one; the `code` string in
/// [`GatewayError::code`] is what callers see in the JSON error body and is
/// stable API surface, independent of the Rust variant names.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid request body: {0}")]
    InvalidJson(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("rate limit exceeded")]
    RateExceeded,

    #[error("admission queue full")]
    QueueFull,

    #[error("admission queue wait timed out")]
    QueueWaitTimeout,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("all channels failed")]
    BadGateway,

    #[error("no channel available: {0}")]
    UpstreamUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),

    #[error(transparent)]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Crate-wide result alias; every fallible function threading `GatewayError`
/// through the relay pipeline returns this instead of spelling it out.
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// Stable machine-readable error code, surfaced in the JSON error body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) | Self::Serialization(_) | Self::Yaml(_) => "invalid_json",
            Self::Validation(_) => "validation",
            Self::Unauthorized(_) | Self::Jwt(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::ModelNotFound(_) => "model_not_found",
            Self::RateExceeded => "rate_exceeded",
            Self::QueueFull => "queue_full",
            Self::QueueWaitTimeout => "queue_wait_timeout",
            Self::BadGateway => "bad_gateway",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Internal(_) | Self::Config(_) | Self::Database(_) | Self::HttpClient(_)
            | Self::Io(_) => "internal",
        }
    }

    pub fn invalid_json<S: Into<String>>(message: S) -> Self {
        Self::InvalidJson(message.into())
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden<S: Into<String>>(message: S) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn model_not_found<S: Into<String>>(model: S) -> Self {
        Self::ModelNotFound(model.into())
    }

    pub fn upstream_unavailable<S: Into<String>>(message: S) -> Self {
        Self::UpstreamUnavailable(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidJson(_) | Self::Validation(_) | Self::Serialization(_) | Self::Yaml(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) | Self::Jwt(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::ModelNotFound(_) => StatusCode::NOT_FOUND,
            Self::RateExceeded | Self::QueueFull | Self::QueueWaitTimeout => {
                StatusCode::TOO_MANY_REQUESTS
            }
            Self::BadGateway => StatusCode::BAD_GATEWAY,
            Self::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_)
            | Self::Config(_)
            | Self::Database(_)
            | Self::HttpClient(_)
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            // Don't leak internal error detail to callers.
            Self::Database(_) | Self::HttpClient(_) | Self::Io(_) => {
                "an internal error occurred".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
                request_id: None,
            },
        })
    }
}

/// Standard JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    /// Populated by request-id middleware before the response is written.
    pub request_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_spec_table() {
        assert_eq!(
            GatewayError::validation("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::unauthorized("x").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::model_not_found("gpt-x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(GatewayError::RateExceeded.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(GatewayError::QueueFull.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(GatewayError::BadGateway.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            GatewayError::upstream_unavailable("x").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn error_codes_are_stable_strings() {
        assert_eq!(GatewayError::QueueWaitTimeout.code(), "queue_wait_timeout");
        assert_eq!(GatewayError::validation("x").code(), "validation");
    }
}
