//! HTTP middleware

pub mod error_details;
pub mod metrics;
pub mod security_headers;

pub use error_details::error_details_middleware;
pub use metrics::metrics_middleware;
pub use security_headers::security_headers_middleware;
