//! HTTP client used by remote sources
//!
//! - [`config`]: client settings and `reqwest::Client` construction
//! - [`http`]: rate-limited requests with backoff and image streaming

pub mod config;
pub mod http;

pub use config::ClientConfig;
pub use http::{HttpHandler, ImageResponse};
