//! Upstream token exchange
//!
//! Types and client for the provider's OAuth2 token endpoint. The gateway
//! performs exactly one upstream attempt per inbound call; retries are the
//! caller's responsibility.

mod token_client;

pub use token_client::TokenClient;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Inbound authorization-code exchange payload
#[derive(Debug, Deserialize)]
pub struct ExchangeRequest {
    /// Opaque authorization grant from the provider's consent flow
    #[serde(default)]
    pub code: Option<String>,
    /// Opaque CSRF state, passthrough only, never validated or forwarded
    #[serde(default)]
    pub state: Option<String>,
}

/// Inbound token refresh payload
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    /// Opaque refresh token previously issued by the provider
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Token set returned by the provider, passed through to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Short-lived credential for the provider's data API
    pub access_token: String,
    /// Longer-lived credential for obtaining new access tokens
    #[serde(default)]
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Token type, typically `Bearer`
    pub token_type: String,
    /// Granted scopes, in provider order
    #[serde(default)]
    pub scope: Vec<String>,
}

impl TokenResponse {
    /// Refresh grants may omit a rotated refresh token; the caller must
    /// still receive a usable one, so fall back to the token it supplied.
    pub fn fill_refresh_token(&mut self, supplied: &str) {
        if self.refresh_token.is_empty() {
            self.refresh_token = supplied.to_string();
        }
    }
}

/// Provider failure body per OAuth2 conventions. Never exposed verbatim.
#[derive(Debug, Deserialize)]
pub struct ProviderError {
    /// Machine-readable OAuth error code
    #[serde(default)]
    pub error: String,
    /// Optional human-readable description
    #[serde(default)]
    pub error_description: Option<String>,
}

/// The two upstream exchange operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOperation {
    /// Authorization-code to token exchange
    Exchange,
    /// Refresh-token exchange
    Refresh,
}

impl TokenOperation {
    /// Stable error key when the provider rejects this operation
    pub fn rejected_error(self) -> &'static str {
        match self {
            Self::Exchange => "Token exchange failed",
            Self::Refresh => "Token refresh failed",
        }
    }

    /// Generic caller-facing message when the provider is unreachable
    pub fn unavailable_message(self) -> &'static str {
        match self {
            Self::Exchange => "Failed to exchange authorization code",
            Self::Refresh => "Failed to refresh access token",
        }
    }

    pub(crate) fn grant_type(self) -> &'static str {
        match self {
            Self::Exchange => "authorization_code",
            Self::Refresh => "refresh_token",
        }
    }
}

impl fmt::Display for TokenOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exchange => write!(f, "Token exchange"),
            Self::Refresh => write!(f, "Token refresh"),
        }
    }
}
