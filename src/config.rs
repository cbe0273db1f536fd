//! Configuration management
//!
//! Configuration is read once at startup (YAML file merged with
//! `AUTH_GATEWAY_*` environment variables), validated, and shared read-only
//! for the process lifetime. Upstream credentials are mandatory; the gateway
//! refuses to start without them.

use std::fmt;
use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Deserializer};
use url::Url;

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Upstream OAuth provider configuration
    pub upstream: UpstreamConfig,
    /// Cross-origin policy configuration
    pub cors: CorsConfig,
    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
    /// Optional API-key authentication configuration
    pub auth: AuthConfig,
}

impl Config {
    /// Load configuration from file and environment, then validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or is missing mandatory upstream credentials.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (AUTH_GATEWAY_ prefix)
        figment = figment.merge(Env::prefixed("AUTH_GATEWAY_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate mandatory values and tunables.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming every missing credential, or the first
    /// URI/tunable that does not parse.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.upstream.client_id.is_empty() {
            missing.push("upstream.client_id");
        }
        if self.upstream.client_secret.is_empty() {
            missing.push("upstream.client_secret");
        }
        if self.upstream.redirect_uri.is_empty() {
            missing.push("upstream.redirect_uri");
        }
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "Missing required configuration: {}",
                missing.join(", ")
            )));
        }

        Url::parse(&self.upstream.redirect_uri)
            .map_err(|e| Error::Config(format!("Invalid upstream.redirect_uri: {e}")))?;
        Url::parse(&self.upstream.token_url)
            .map_err(|e| Error::Config(format!("Invalid upstream.token_url: {e}")))?;

        if self.rate_limit.enabled
            && (self.rate_limit.max_requests == 0 || self.rate_limit.window_ms == 0)
        {
            return Err(Error::Config(
                "rate_limit.max_requests and rate_limit.window_ms must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Deployment mode (`development` is permissive and verbose)
    pub environment: Environment,
    /// Maximum accepted request body size in bytes
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            environment: Environment::default(),
            body_limit_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Deployment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Permissive mode: unlisted origins are admitted (with a warning) and
    /// internal error detail is exposed in responses.
    #[default]
    Development,
    /// Strict mode: unlisted origins are rejected and internal failures are
    /// flattened to a generic message.
    Production,
}

impl Environment {
    /// Whether this deployment runs in permissive development mode
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Upstream OAuth provider configuration
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// OAuth client ID issued by the provider
    pub client_id: String,
    /// OAuth client secret issued by the provider. Never logged, never
    /// returned to any client.
    pub client_secret: String,
    /// Redirect URI registered with the provider
    pub redirect_uri: String,
    /// Token endpoint URL
    pub token_url: String,
    /// Upstream request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            token_url: "https://auth.smartcar.com/oauth/token".to_string(),
            timeout_secs: 10,
        }
    }
}

// Manual Debug so the client secret cannot leak through debug formatting.
impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("redirect_uri", &self.redirect_uri)
            .field("token_url", &self.token_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Cross-origin policy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins allowed to call the gateway from a browser. Accepts a YAML
    /// list or a comma-separated string (environment variables).
    #[serde(deserialize_with = "comma_separated")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:19006".to_string()],
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Maximum requests per client within the window
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 900_000, // 15 minutes
            max_requests: 100,
        }
    }
}

/// Optional API-key authentication configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Static API key clients must present in `x-api-key`. Unset or empty
    /// disables the guard entirely.
    pub api_key: Option<String>,
    /// Paths that stay public when the guard is active. A pattern matches
    /// exactly or as a `pattern/` prefix.
    pub public_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            public_paths: vec!["/".to_string(), "/api/auth/health".to_string()],
        }
    }
}

impl AuthConfig {
    /// The configured API key, treating an empty string as disabled
    pub fn active_api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

/// Accept either a sequence or a comma-separated string (env var form)
fn comma_separated<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::List(list) => list,
        Raw::Csv(csv) => csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.upstream.client_id = "client-id".to_string();
        config.upstream.client_secret = "client-secret".to_string();
        config.upstream.redirect_uri = "https://app.example/callback".to_string();
        config
    }

    #[test]
    fn default_config_is_rejected_without_credentials() {
        let err = Config::default().validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("upstream.client_id"));
        assert!(message.contains("upstream.client_secret"));
        assert!(message.contains("upstream.redirect_uri"));
    }

    #[test]
    fn complete_config_validates() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn unparseable_redirect_uri_is_rejected() {
        let mut config = valid_config();
        config.upstream.redirect_uri = "not a uri".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("redirect_uri"));
    }

    #[test]
    fn zero_rate_limit_window_is_rejected() {
        let mut config = valid_config();
        config.rate_limit.window_ms = 0;
        assert!(config.validate().is_err());

        config.rate_limit.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn allowed_origins_accepts_comma_separated_string() {
        let cors: CorsConfig = serde_json::from_value(serde_json::json!({
            "allowed_origins": "https://a.example, https://b.example,"
        }))
        .unwrap();
        assert_eq!(
            cors.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn allowed_origins_accepts_list() {
        let cors: CorsConfig = serde_json::from_value(serde_json::json!({
            "allowed_origins": ["https://a.example"]
        }))
        .unwrap();
        assert_eq!(cors.allowed_origins, vec!["https://a.example".to_string()]);
    }

    #[test]
    fn empty_api_key_means_guard_disabled() {
        let mut auth = AuthConfig::default();
        assert_eq!(auth.active_api_key(), None);

        auth.api_key = Some(String::new());
        assert_eq!(auth.active_api_key(), None);

        auth.api_key = Some("sekret".to_string());
        assert_eq!(auth.active_api_key(), Some("sekret"));
    }

    #[test]
    fn debug_output_redacts_client_secret() {
        let config = valid_config();
        let rendered = format!("{:?}", config.upstream);
        assert!(rendered.contains("[redacted]"));
        assert!(!rendered.contains("client-secret"));
    }
}
