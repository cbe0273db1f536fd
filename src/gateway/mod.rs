//! HTTP gateway: request pipeline and server bootstrap
//!
//! Pipeline order (outermost first): trace, compression, catch-panic,
//! failure logging, security headers, origin policy, rate limiter,
//! API-key guard, body limit, route dispatch. A rejection at any stage
//! short-circuits the rest.

pub mod auth;
pub mod origin;
pub mod rate_limit;
pub mod router;
pub mod server;

pub use server::Gateway;
