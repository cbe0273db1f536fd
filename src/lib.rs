//! Telematics Auth Gateway
//!
//! OAuth2 token-exchange gateway for vehicle-telematics APIs. Sits between a
//! mobile/web client and the provider's token endpoint, performing the
//! authorization-code and refresh-token exchanges server-side so the
//! provider's client secret never reaches the device.
//!
//! # Features
//!
//! - **Guarded pipeline**: origin allow-list, per-client rate limiting,
//!   body-size caps, uniform error envelopes
//! - **Two exchange operations**: authorization-code exchange and token
//!   refresh against the upstream token endpoint
//! - **Production Ready**: graceful shutdown, structured logging, fail-fast
//!   configuration validation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod upstream;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
