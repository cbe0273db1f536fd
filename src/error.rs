//! Error types and the centralized response translator
//!
//! Every handler failure flows through one translation point: the tagged
//! [`Error`] taxonomy maps to an HTTP status and an [`ApiEnvelope`] body.
//! Raw upstream bodies and internal detail never reach the caller; in
//! production mode internal failures are flattened to a generic message.

use std::io;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::envelope::ApiEnvelope;
use crate::upstream::TokenOperation;

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller supplied insufficient or malformed input
    #[error("{summary}: {detail}")]
    InvalidRequest {
        /// Stable error key shown to the caller
        summary: &'static str,
        /// Human-readable detail
        detail: &'static str,
    },

    /// Missing or invalid API credential
    #[error("{summary}")]
    Unauthorized {
        /// Stable error key shown to the caller
        summary: &'static str,
        /// Human-readable detail
        detail: &'static str,
    },

    /// Client exceeded its request quota
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Provider returned a declared OAuth error
    #[error("{operation} rejected by provider ({code})")]
    UpstreamRejected {
        /// Which exchange operation failed
        operation: TokenOperation,
        /// Provider error code (logged, surfaced only as fallback text)
        code: String,
        /// Provider's human-readable description
        description: Option<String>,
    },

    /// Provider unreachable, timed out, or answered with garbage
    #[error("{operation} unavailable: {detail}")]
    UpstreamUnavailable {
        /// Which exchange operation failed
        operation: TokenOperation,
        /// Transport/parse detail, for the log only
        detail: String,
    },

    /// Unmatched route
    #[error("Route {0} not found")]
    NotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The missing-authorization-code rejection
    pub fn missing_code() -> Self {
        Self::InvalidRequest {
            summary: "Missing authorization code",
            detail: "Authorization code is required",
        }
    }

    /// The missing-refresh-token rejection
    pub fn missing_refresh_token() -> Self {
        Self::InvalidRequest {
            summary: "Missing refresh token",
            detail: "Refresh token is required",
        }
    }

    /// HTTP status this error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. } | Self::UpstreamRejected { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UpstreamUnavailable { .. }
            | Self::Config(_)
            | Self::Io(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build the caller-facing envelope for this error.
    ///
    /// `expose_detail` is true only in development mode; production flattens
    /// unclassified failures to a generic message.
    pub fn envelope(&self, expose_detail: bool) -> ApiEnvelope<()> {
        match self {
            Self::InvalidRequest { summary, detail } | Self::Unauthorized { summary, detail } => {
                ApiEnvelope::failure(*summary, *detail)
            }
            Self::RateLimited => ApiEnvelope::failure(
                "Too many requests",
                "Rate limit exceeded. Please try again later.",
            ),
            Self::UpstreamRejected {
                operation,
                code,
                description,
            } => {
                let message = description
                    .clone()
                    .filter(|d| !d.is_empty())
                    .or_else(|| (!code.is_empty()).then(|| code.clone()))
                    .unwrap_or_else(|| "Unknown error".to_string());
                ApiEnvelope::failure(operation.rejected_error(), message)
            }
            Self::UpstreamUnavailable { operation, .. } => {
                ApiEnvelope::failure("Internal server error", operation.unavailable_message())
            }
            Self::NotFound(path) => {
                ApiEnvelope::failure("Not found", format!("Route {path} not found"))
            }
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                let error = if expose_detail {
                    self.to_string()
                } else {
                    "Internal server error".to_string()
                };
                ApiEnvelope::failure(error, "Something went wrong on our end")
            }
        }
    }
}

/// An [`Error`] bound to the deployment mode, ready to become a response.
///
/// Handlers produce this via [`crate::gateway::router::AppState::fail`] so
/// the development/production distinction is carried explicitly instead of
/// through an ambient global.
#[derive(Debug)]
pub struct ApiError {
    error: Error,
    expose_detail: bool,
}

impl ApiError {
    /// Bind an error to the deployment mode
    pub fn new(error: Error, expose_detail: bool) -> Self {
        Self {
            error,
            expose_detail,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.error, "Request failed");
        } else {
            tracing::warn!(status = %status, error = %self.error, "Request rejected");
        }
        (status, Json(self.error.envelope(self.expose_detail))).into_response()
    }
}
