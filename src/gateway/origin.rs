//! Origin policy: cross-origin allow-list enforcement
//!
//! Browser callers declare an `Origin`; non-browser clients (mobile apps,
//! curl) send none and are always admitted. Unlisted origins are admitted
//! in development mode with a warning, rejected in production with a plain
//! 403 - the rejection happens before any envelope exists.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::config::Config;

/// Outcome of evaluating a request's declared origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginDecision {
    /// No origin declared, or the origin is on the allow-list
    Allowed,
    /// Unlisted origin admitted because the deployment is permissive
    AllowedPermissive,
    /// Unlisted origin in production mode
    Denied,
}

/// Per-request origin allow/deny policy
#[derive(Debug)]
pub struct OriginPolicy {
    allowed_origins: Vec<String>,
    permissive: bool,
}

impl OriginPolicy {
    /// Build the policy from configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            allowed_origins: config.cors.allowed_origins.clone(),
            permissive: config.server.environment.is_development(),
        }
    }

    /// Decide whether a declared origin is permitted. Every permissive
    /// allow and every deny is logged with the offending origin.
    pub fn evaluate(&self, origin: Option<&str>) -> OriginDecision {
        // No origin header: mobile apps, curl, server-to-server
        let Some(origin) = origin else {
            return OriginDecision::Allowed;
        };

        if self.allowed_origins.iter().any(|o| o == origin) {
            return OriginDecision::Allowed;
        }

        if self.permissive {
            warn!(origin = %origin, "Allowing unlisted origin in development mode");
            return OriginDecision::AllowedPermissive;
        }

        warn!(origin = %origin, "Blocked origin");
        OriginDecision::Denied
    }
}

/// Origin-policy middleware: rejects disallowed origins, answers preflight,
/// and reflects CORS headers for admitted browser callers.
pub async fn enforce(
    State(policy): State<Arc<OriginPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let origin_value = request.headers().get(header::ORIGIN).cloned();
    let origin = origin_value.as_ref().and_then(|v| v.to_str().ok());

    if policy.evaluate(origin) == OriginDecision::Denied {
        return (StatusCode::FORBIDDEN, "Not allowed by CORS").into_response();
    }

    if request.method() == Method::OPTIONS && origin_value.is_some() {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(response.headers_mut(), origin_value.as_ref());
        apply_preflight_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut(), origin_value.as_ref());
    response
}

fn apply_cors_headers(headers: &mut HeaderMap, origin: Option<&HeaderValue>) {
    if let Some(origin) = origin {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
    }
}

fn apply_preflight_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization, X-Api-Key"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("600"),
    );
}
