//! Transport collaborator: performs the network call for a request description

mod http;

pub use self::http::HttpTransport;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportFailure;
use crate::fingerprint::RequestDescription;

/// Performs a single network call.
///
/// Implementations neither cache nor retry; the dispatcher decides when a call
/// is needed and fans the outcome out to every waiter.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform `description` and return the raw decoded result
    async fn perform(&self, description: &RequestDescription) -> Result<Value, TransportFailure>;
}
