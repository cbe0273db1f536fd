//! Per-client rate limiting
//!
//! Keyed GCRA limiter (sliding window): each client address gets
//! `max_requests` of quota replenished over `window_ms`. The keyed store
//! handles per-key atomicity, so concurrent bursts from one client cannot
//! undercount. Quota metadata rides on every response as `x-ratelimit-*`
//! headers.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    middleware::StateInformationMiddleware,
    state::keyed::DefaultKeyedStateStore,
};
use tracing::warn;

use crate::Error;
use crate::config::RateLimitConfig;

type KeyedLimiter =
    RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock, StateInformationMiddleware>;

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Quota metadata attached to every response
#[derive(Debug, Clone, Copy)]
pub struct QuotaStatus {
    /// Configured maximum for the window
    pub limit: u32,
    /// Requests left before rejection
    pub remaining: u32,
    /// Time until the consumed quota is replenished
    pub reset: Duration,
}

/// Per-client request quota over a sliding window
pub struct RateLimit {
    limiter: Option<KeyedLimiter>,
    clock: DefaultClock,
    max_requests: u32,
    window: Duration,
}

impl RateLimit {
    /// Build the limiter from configuration; a disabled config admits
    /// everything.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let window = Duration::from_millis(config.window_ms);
        let limiter = if config.enabled {
            let max = NonZeroU32::new(config.max_requests).unwrap_or(NonZeroU32::MIN);
            let period = window / config.max_requests.max(1);
            let quota = Quota::with_period(period)
                .unwrap_or_else(|| Quota::per_second(max))
                .allow_burst(max);
            Some(RateLimiter::keyed(quota).with_middleware::<StateInformationMiddleware>())
        } else {
            None
        };

        Self {
            limiter,
            clock: DefaultClock::default(),
            max_requests: config.max_requests,
            window,
        }
    }

    /// Admit or reject one request for `key`. `Ok` carries the remaining
    /// quota; `Err` carries the metadata plus the wait until a slot frees.
    pub fn check(&self, key: IpAddr) -> Result<QuotaStatus, (QuotaStatus, Duration)> {
        let Some(limiter) = &self.limiter else {
            return Ok(QuotaStatus {
                limit: self.max_requests,
                remaining: self.max_requests,
                reset: Duration::ZERO,
            });
        };

        match limiter.check_key(&key) {
            Ok(snapshot) => {
                let remaining = snapshot.remaining_burst_capacity();
                let used = self.max_requests.saturating_sub(remaining);
                let replenish_one = self
                    .window
                    .checked_div(self.max_requests.max(1))
                    .unwrap_or_default();
                Ok(QuotaStatus {
                    limit: self.max_requests,
                    remaining,
                    reset: replenish_one * used,
                })
            }
            Err(not_until) => {
                let wait = not_until.wait_time_from(self.clock.now());
                Err((
                    QuotaStatus {
                        limit: self.max_requests,
                        remaining: 0,
                        reset: wait,
                    },
                    wait,
                ))
            }
        }
    }
}

/// Rate-limit middleware: rejects over-quota clients with the fixed 429
/// envelope and stamps quota headers on every response.
pub async fn enforce(
    State(limit): State<Arc<RateLimit>>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_ip(&request);

    match limit.check(client) {
        Ok(status) => {
            let mut response = next.run(request).await;
            apply_quota_headers(response.headers_mut(), &status);
            response
        }
        Err((status, wait)) => {
            let user_agent = request
                .headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            warn!(
                client = %client,
                user_agent = %user_agent,
                path = %request.uri().path(),
                "Rate limit exceeded"
            );

            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(Error::RateLimited.envelope(false)),
            )
                .into_response();
            apply_quota_headers(response.headers_mut(), &status);
            if let Ok(value) = HeaderValue::from_str(&ceil_secs(wait).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
    }
}

/// Client identity: first `X-Forwarded-For` entry (the gateway sits behind
/// a trusted proxy in deployment) falling back to the socket peer address.
pub fn client_ip(request: &Request) -> IpAddr {
    forwarded_for(request.headers())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|connect| connect.0.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

fn apply_quota_headers(headers: &mut HeaderMap, status: &QuotaStatus) {
    let entries = [
        (LIMIT_HEADER, status.limit.to_string()),
        (REMAINING_HEADER, status.remaining.to_string()),
        (RESET_HEADER, ceil_secs(status.reset).to_string()),
    ];
    for (name, value) in entries {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 { secs + 1 } else { secs }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(window_ms: u64, max_requests: u32) -> RateLimit {
        RateLimit::from_config(&RateLimitConfig {
            enabled: true,
            window_ms,
            max_requests,
        })
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn sixth_request_in_window_is_rejected() {
        let limit = limit(60_000, 5);
        for _ in 0..5 {
            assert!(limit.check(ip(1)).is_ok());
        }
        assert!(limit.check(ip(1)).is_err());
    }

    #[test]
    fn clients_are_counted_independently() {
        let limit = limit(60_000, 2);
        assert!(limit.check(ip(1)).is_ok());
        assert!(limit.check(ip(1)).is_ok());
        assert!(limit.check(ip(1)).is_err());
        assert!(limit.check(ip(2)).is_ok());
    }

    #[test]
    fn quota_is_admitted_again_after_the_window() {
        let limit = limit(200, 2);
        assert!(limit.check(ip(3)).is_ok());
        assert!(limit.check(ip(3)).is_ok());
        assert!(limit.check(ip(3)).is_err());

        std::thread::sleep(Duration::from_millis(250));
        assert!(limit.check(ip(3)).is_ok());
    }

    #[test]
    fn remaining_quota_decreases_per_request() {
        let limit = limit(60_000, 3);
        assert_eq!(limit.check(ip(4)).unwrap().remaining, 2);
        assert_eq!(limit.check(ip(4)).unwrap().remaining, 1);
        assert_eq!(limit.check(ip(4)).unwrap().remaining, 0);
        let (status, wait) = limit.check(ip(4)).unwrap_err();
        assert_eq!(status.remaining, 0);
        assert!(wait <= Duration::from_millis(60_000));
    }

    #[test]
    fn disabled_limiter_admits_everything() {
        let limit = RateLimit::from_config(&RateLimitConfig {
            enabled: false,
            window_ms: 1,
            max_requests: 1,
        });
        for _ in 0..100 {
            assert!(limit.check(ip(5)).is_ok());
        }
    }

    #[test]
    fn forwarded_for_takes_the_first_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(forwarded_for(&headers), Some("203.0.113.9".parse().unwrap()));
    }

    #[test]
    fn garbage_forwarded_for_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        assert_eq!(forwarded_for(&headers), None);
    }
}
