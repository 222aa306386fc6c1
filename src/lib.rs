//! Request Coalescer Library
//!
//! Client-side request coalescing and short-lived response caching for HTTP APIs.
//!
//! # Features
//!
//! - **Coalescing**: concurrent requests with the same fingerprint share one network call
//! - **Response cache**: successful payloads are reused for a short TTL, swept lazily
//! - **Latency floor**: fast calls are held back to a minimum perceived latency
//! - **Error normalization**: transport failures collapse into a single error shape
//!
//! # Example
//!
//! ```no_run
//! use request_coalescer::{ApiService, RequestDescription, config::Config};
//!
//! # async fn run() -> request_coalescer::Result<()> {
//! let service = ApiService::from_config(&Config::default())?;
//! let overview: serde_json::Value = service
//!     .request(RequestDescription::get("http://localhost:23333/api/overview"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cache;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fingerprint;
pub mod normalize;
pub mod stats;
pub mod transport;

pub use dispatcher::ApiService;
pub use error::{Error, RequestError, Result, TransportFailure};
pub use fingerprint::{RequestDescription, fingerprint};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
