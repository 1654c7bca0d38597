//! Middleware for observability.
//!
//! This module provides request logging with latency tracking. Login
//! throttling lives in `auth::throttle`, where the attempt rows are.

pub mod logging;

pub use logging::request_logging;
