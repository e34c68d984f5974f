//! HTTP middleware: admin authentication, client IP resolution, rate limiting,
//! hotlink protection, request validation and response security headers.

pub mod auth;
pub mod ip;
pub mod rate_limit;
pub mod referrer;
pub mod security_headers;
pub mod validation;

pub use rate_limit::EndpointRateLimiter;
