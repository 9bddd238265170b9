//! Error types for pondmetrics
//!
//! `MetricsError` covers misuse of the registry and instruments. These are
//! programmer errors: synchronous, local and never worth retrying.
//! `AppError` covers the service around it and implements `IntoResponse`
//! for Axum handlers.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors raised by the registry and the instruments it hands out
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    #[error("metric '{name}' is already registered")]
    DuplicateName { name: String },

    #[error("metric '{name}' expects {expected} label values, got {got}")]
    LabelCardinality {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid metric descriptor: {0}")]
    InvalidDescriptor(String),
}

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read configuration file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("Failed to encode metrics: {0}")]
    Encode(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. }
            | Self::Metrics(_)
            | Self::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
