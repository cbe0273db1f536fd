//! Optional API-key guard
//!
//! Credential-gated access is an explicitly enabled capability: the guard
//! is inert unless a non-empty `auth.api_key` is configured. When active,
//! clients must present the key in `x-api-key` on every non-public path.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::Error;
use crate::config::AuthConfig;

/// Static API-key requirement with public-path exemptions
#[derive(Debug)]
pub struct ApiKeyGuard {
    api_key: Option<String>,
    public_paths: Vec<String>,
}

impl ApiKeyGuard {
    /// Build the guard from configuration; an unset or empty key leaves it
    /// inert.
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            api_key: config.active_api_key().map(ToOwned::to_owned),
            public_paths: config.public_paths.clone(),
        }
    }

    /// Whether the guard checks anything at all
    pub fn is_active(&self) -> bool {
        self.api_key.is_some()
    }

    /// Whether a path bypasses the guard. A pattern matches exactly or as
    /// a directory prefix, so `/` stays exact instead of matching the
    /// whole tree.
    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|pattern| {
            path == pattern
                || (pattern != "/" && path.starts_with(pattern.as_str()) && {
                    path.as_bytes().get(pattern.len()) == Some(&b'/')
                })
        })
    }
}

/// API-key middleware
pub async fn require_api_key(
    State(guard): State<Arc<ApiKeyGuard>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = &guard.api_key else {
        return next.run(request).await;
    };

    let path = request.uri().path();
    if guard.is_public_path(path) {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    match provided {
        None => {
            warn!(path = %path, "API request without API key");
            unauthorized(
                "API key required",
                "Please provide a valid API key in the x-api-key header",
            )
        }
        Some(key) if key != expected => {
            // Partial key only, for correlating a misconfigured client
            warn!(
                path = %path,
                provided = %redact(key),
                "API request with invalid API key"
            );
            unauthorized("Invalid API key", "The provided API key is not valid")
        }
        Some(_) => next.run(request).await,
    }
}

fn unauthorized(summary: &'static str, detail: &'static str) -> Response {
    let error = Error::Unauthorized { summary, detail };
    (error.status_code(), Json(error.envelope(false))).into_response()
}

fn redact(key: &str) -> String {
    let prefix: String = key.chars().take(8).collect();
    format!("{prefix}...")
}
