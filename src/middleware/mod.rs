//! HTTP middleware.
//!
//! Request logging with latency tracking. Per-IP rate limiting is out of
//! core scope; brute-force protection instead lives in `authz`'s
//! per-account lockout (spec §4.9).

pub mod logging;

pub use logging::{request_logging, request_logging_simple};
