//! HTTP client for the provider's token endpoint

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{Client, header};
use tracing::{error, info};
use url::Url;

use super::{ProviderError, TokenOperation, TokenResponse};
use crate::config::UpstreamConfig;
use crate::{Error, Result};

/// Client for the provider's OAuth2 token endpoint.
///
/// Holds a precomputed HTTP Basic credential; the client secret itself is
/// dropped after construction and never logged.
#[derive(Debug)]
pub struct TokenClient {
    http: Client,
    token_url: Url,
    redirect_uri: String,
    basic_credentials: String,
}

impl TokenClient {
    /// Build a token client from the upstream configuration
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let token_url = Url::parse(&config.token_url)
            .map_err(|e| Error::Config(format!("Invalid upstream.token_url: {e}")))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!(
                "telematics-auth-gateway/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        let basic_credentials =
            STANDARD.encode(format!("{}:{}", config.client_id, config.client_secret));

        Ok(Self {
            http,
            token_url,
            redirect_uri: config.redirect_uri.clone(),
            basic_credentials,
        })
    }

    /// Exchange an authorization code for a token set
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        let operation = TokenOperation::Exchange;
        let params = [
            ("grant_type", operation.grant_type()),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let tokens = self.post_grant(operation, &params).await?;
        info!(
            token_type = %tokens.token_type,
            expires_in = tokens.expires_in,
            scope = ?tokens.scope,
            "Token exchange successful"
        );
        Ok(tokens)
    }

    /// Refresh an access token. A successful refresh never returns an empty
    /// refresh token: if the provider omits a rotated one, the supplied
    /// token is passed back.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        let operation = TokenOperation::Refresh;
        let params = [
            ("grant_type", operation.grant_type()),
            ("refresh_token", refresh_token),
        ];

        let mut tokens = self.post_grant(operation, &params).await?;
        tokens.fill_refresh_token(refresh_token);
        info!(
            token_type = %tokens.token_type,
            expires_in = tokens.expires_in,
            "Token refresh successful"
        );
        Ok(tokens)
    }

    /// Single upstream attempt: form POST with Basic authorization.
    /// Transport and parse failures map to `UpstreamUnavailable`; declared
    /// provider errors map to `UpstreamRejected` with the raw body kept out
    /// of the result.
    async fn post_grant(
        &self,
        operation: TokenOperation,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse> {
        let response = self
            .http
            .post(self.token_url.clone())
            .header(
                header::AUTHORIZATION,
                format!("Basic {}", self.basic_credentials),
            )
            .form(params)
            .send()
            .await
            .map_err(|e| unavailable(operation, format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| unavailable(operation, format!("failed to read response: {e}")))?;

        if !status.is_success() {
            // Only a parseable OAuth error body counts as a provider
            // rejection; anything else (an intermediary's HTML error page,
            // a truncated body) means the provider never answered.
            let Ok(provider_error) = serde_json::from_slice::<ProviderError>(&body) else {
                let snippet: String = String::from_utf8_lossy(&body).chars().take(120).collect();
                return Err(unavailable(
                    operation,
                    format!("provider answered {status} without an OAuth error body: {snippet}"),
                ));
            };
            error!(
                operation = %operation,
                status = %status,
                code = %provider_error.error,
                description = ?provider_error.error_description,
                "Provider rejected token request"
            );
            return Err(Error::UpstreamRejected {
                operation,
                code: provider_error.error,
                description: provider_error.error_description,
            });
        }

        serde_json::from_slice(&body)
            .map_err(|e| unavailable(operation, format!("malformed token response: {e}")))
    }
}

fn unavailable(operation: TokenOperation, detail: String) -> Error {
    error!(operation = %operation, detail = %detail, "Upstream token endpoint unavailable");
    Error::UpstreamUnavailable { operation, detail }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream_config() -> UpstreamConfig {
        UpstreamConfig {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_uri: "https://app.example/callback".to_string(),
            token_url: "https://auth.provider.example/oauth/token".to_string(),
            timeout_secs: 10,
        }
    }

    #[test]
    fn builds_basic_credentials_from_id_and_secret() {
        let client = TokenClient::new(&upstream_config()).unwrap();
        assert_eq!(
            client.basic_credentials,
            STANDARD.encode("client-id:client-secret")
        );
    }

    #[test]
    fn rejects_unparseable_token_url() {
        let mut config = upstream_config();
        config.token_url = "definitely not a url".to_string();
        let err = TokenClient::new(&config).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
