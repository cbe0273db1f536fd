//! HTTP router and handlers

use std::any::Any;
use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{DefaultBodyLimit, FromRequest, OriginalUri, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tower_http::{
    catch_panic::CatchPanicLayer, compression::CompressionLayer, trace::TraceLayer,
};
use tracing::{info, warn};

use super::auth::{self, ApiKeyGuard};
use super::origin::{self, OriginPolicy};
use super::rate_limit::{self, RateLimit};
use crate::config::Config;
use crate::envelope::ApiEnvelope;
use crate::error::ApiError;
use crate::upstream::{ExchangeRequest, RefreshRequest, TokenClient, TokenResponse};
use crate::{Error, Result};

/// Shared application state
pub struct AppState {
    /// Process-wide configuration, read-only after startup
    pub config: Arc<Config>,
    /// Upstream token-endpoint client
    pub tokens: TokenClient,
}

impl AppState {
    /// Build the shared state from validated configuration
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let tokens = TokenClient::new(&config.upstream)?;
        Ok(Self { config, tokens })
    }

    /// Bind an error to the deployment mode for response translation
    pub fn fail(&self, error: Error) -> ApiError {
        ApiError::new(error, self.config.server.environment.is_development())
    }
}

/// Create the router with the full middleware pipeline
pub fn create_router(state: Arc<AppState>) -> Router {
    pipeline(routes(), state)
}

/// The gateway's route table, before any middleware is applied
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(banner_handler))
        .route("/api/auth/health", get(health_handler))
        .route("/api/auth/exchange", post(exchange_handler))
        .route("/api/auth/refresh", post(refresh_handler))
        .fallback(not_found_handler)
}

/// Wrap a route table in the middleware pipeline
pub fn pipeline(routes: Router<Arc<AppState>>, state: Arc<AppState>) -> Router {
    let origin_policy = Arc::new(OriginPolicy::from_config(&state.config));
    let rate_limit = Arc::new(RateLimit::from_config(&state.config.rate_limit));
    let api_key_guard = Arc::new(ApiKeyGuard::from_config(&state.config.auth));
    let body_limit = state.config.server.body_limit_bytes;

    routes
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(
            api_key_guard,
            auth::require_api_key,
        ))
        .layer(middleware::from_fn_with_state(
            rate_limit,
            rate_limit::enforce,
        ))
        .layer(middleware::from_fn_with_state(origin_policy, origin::enforce))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(log_failures))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET / - service banner
async fn banner_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Telematics Auth Gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "environment": state.config.server.environment.to_string(),
    }))
}

/// GET /api/auth/health - liveness banner
async fn health_handler() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Telematics Auth Gateway is running",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /api/auth/exchange - authorization-code exchange
async fn exchange_handler(
    State(state): State<Arc<AppState>>,
    JsonOrForm(payload): JsonOrForm<ExchangeRequest>,
) -> std::result::Result<Json<ApiEnvelope<TokenResponse>>, ApiError> {
    let code = payload
        .code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .ok_or_else(|| state.fail(Error::missing_code()))?;

    // state is passthrough only; log its presence, never its value
    info!(has_state = payload.state.is_some(), "Token exchange request");

    let tokens = state
        .tokens
        .exchange_code(code)
        .await
        .map_err(|e| state.fail(e))?;

    Ok(Json(ApiEnvelope::ok(tokens, "Token exchange successful")))
}

/// POST /api/auth/refresh - refresh-token exchange
async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    JsonOrForm(payload): JsonOrForm<RefreshRequest>,
) -> std::result::Result<Json<ApiEnvelope<TokenResponse>>, ApiError> {
    let refresh_token = payload
        .refresh_token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| state.fail(Error::missing_refresh_token()))?;

    info!("Token refresh request");

    let tokens = state
        .tokens
        .refresh(refresh_token)
        .await
        .map_err(|e| state.fail(e))?;

    Ok(Json(ApiEnvelope::ok(tokens, "Token refresh successful")))
}

/// Fallback for unmatched routes
async fn not_found_handler(State(state): State<Arc<AppState>>, uri: OriginalUri) -> ApiError {
    state.fail(Error::NotFound(uri.path().to_string()))
}

/// Extractor accepting JSON and URL-encoded form bodies
pub struct JsonOrForm<T>(pub T);

impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| malformed_body(&e))?;
            return Ok(Self(value));
        }

        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| malformed_body(&e))?;
        Ok(Self(value))
    }
}

fn malformed_body(rejection: &dyn std::fmt::Display) -> Response {
    warn!(error = %rejection, "Malformed request body");
    (
        StatusCode::BAD_REQUEST,
        Json(ApiEnvelope::<()>::failure(
            "Invalid request body",
            "Request body must be valid JSON or form data",
        )),
    )
        .into_response()
}

/// Stamp HSTS and a restrictive CSP on every response
async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains; preload"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; \
             img-src 'self' data: https:",
        ),
    );
    response
}

/// Log request metadata for every error-status response before it is sent
async fn log_failures(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client = rate_limit::client_ip(&request);
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let response = next.run(request).await;

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        warn!(
            method = %method,
            path = %path,
            client = %client,
            user_agent = %user_agent,
            status = %status,
            "Request error"
        );
    }
    response
}

/// Translate a handler panic into a generic 500 envelope instead of a
/// dropped connection
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(detail = %detail, "Handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiEnvelope::<()>::failure(
            "Internal server error",
            "Something went wrong on our end",
        )),
    )
        .into_response()
}
