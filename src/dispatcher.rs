//! Coalescing dispatcher
//!
//! Every logical request is registered as a waiter on its fingerprint before
//! anything can suspend. The first waiter of a fingerprint (or any forced
//! request) becomes the driver and spawns the fetch sequence; everybody else
//! rides on it. When the fetch sequence ends, its outcome is fanned out to
//! every waiter registered at that moment, each receiving its own copy.
//!
//! # Fetch sequence
//!
//! 1. Serve a fresh cache entry if one exists.
//! 2. Otherwise perform the network call.
//! 3. Hold a fast success back until the minimum latency has elapsed.
//! 4. Unwrap the payload, store it, broadcast it.
//! 5. On failure, classify and broadcast the error. Errors are never cached.
//! 6. Always finish with the end-of-broadcast step.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::cache::ResponseCache;
use crate::config::{Config, DispatchConfig};
use crate::error::RequestError;
use crate::fingerprint::RequestDescription;
use crate::normalize;
use crate::stats::{DispatchStats, StatsSnapshot};
use crate::transport::{HttpTransport, Transport};
use crate::{Error, Result};

/// Terminal signal delivered to a waiter
type Outcome = std::result::Result<Value, RequestError>;

/// Pending waiters keyed by fingerprint
type WaiterMap = HashMap<String, Vec<oneshot::Sender<Outcome>>>;

/// Request coalescing service.
///
/// Cheap to clone; clones share the same cache and waiter lists. Construct one
/// at startup and keep it for the life of the process.
#[derive(Clone)]
pub struct ApiService {
    inner: Arc<Inner>,
}

struct Inner {
    /// Performs the network calls
    transport: Arc<dyn Transport>,
    /// Successful payloads by fingerprint
    cache: ResponseCache,
    /// Callers not yet resolved, in attachment order
    waiters: Mutex<WaiterMap>,
    /// Minimum perceived latency of a network call
    min_latency: Duration,
    /// Counters
    stats: DispatchStats,
}

impl ApiService {
    /// Create a service on top of `transport`
    pub fn new(transport: Arc<dyn Transport>, config: &DispatchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                cache: ResponseCache::new(config.response_ttl),
                waiters: Mutex::new(HashMap::new()),
                min_latency: config.min_latency,
                stats: DispatchStats::default(),
            }),
        }
    }

    /// Create a service backed by an [`HttpTransport`] built from `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(&config.http, &config.auth)?;
        Ok(Self::new(Arc::new(transport), &config.dispatch))
    }

    /// Submit `description` and decode the eventual payload into `T`.
    ///
    /// The request is registered as a waiter when this method is called, not
    /// when the returned future is first polled, so the coalescing decision
    /// follows call order. Dropping the future does not cancel a network call
    /// other waiters may depend on.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, since a driving request
    /// spawns its fetch sequence onto the current runtime.
    pub fn request<T>(
        &self,
        description: RequestDescription,
    ) -> impl Future<Output = Result<T>> + Send + use<T>
    where
        T: DeserializeOwned + Send,
    {
        let pending = self.request_value(description);
        async move {
            let value = pending.await?;
            Ok(serde_json::from_value(value)?)
        }
    }

    /// Submit `description` and return the eventual payload as raw JSON.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn request_value(
        &self,
        description: RequestDescription,
    ) -> impl Future<Output = Result<Value>> + Send + use<> {
        let receiver = self.subscribe(description);
        async move {
            match receiver.await {
                Ok(outcome) => outcome.map_err(Error::from),
                Err(_) => Err(Error::Internal(
                    "request ended without a result".to_string(),
                )),
            }
        }
    }

    /// Register a waiter and, when it is the driver, start the fetch sequence.
    fn subscribe(&self, description: RequestDescription) -> oneshot::Receiver<Outcome> {
        let inner = &self.inner;
        inner.cache.sweep_expired(Instant::now());
        inner.stats.record_request(description.force_request);

        let fingerprint = description.fingerprint();
        let (sender, receiver) = oneshot::channel();

        let waiting = {
            let mut waiters = inner.waiters.lock();
            let list = waiters.entry(fingerprint.clone()).or_default();
            list.push(sender);
            list.len()
        };

        if waiting <= 1 || description.force_request {
            debug!(
                url = %description.url,
                method = %description.method,
                forced = description.force_request,
                "Driving request"
            );
            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                inner.drive(fingerprint, description).await;
            });
        } else {
            debug!(url = %description.url, waiting, "Attached to in-flight request");
            inner.stats.record_coalesced();
        }

        receiver
    }

    /// Current statistics
    pub fn stats(&self) -> StatsSnapshot {
        let in_flight = self.inner.waiters.lock().len();
        self.inner.stats.snapshot(in_flight, self.inner.cache.stats())
    }

    /// Number of network calls performed so far
    pub fn transport_calls(&self) -> u64 {
        self.inner.stats.transport_calls()
    }

    /// Number of callers currently waiting on `description`'s fingerprint
    pub fn waiting(&self, description: &RequestDescription) -> usize {
        self.inner
            .waiters
            .lock()
            .get(&description.fingerprint())
            .map_or(0, Vec::len)
    }
}

impl Inner {
    /// Run the fetch sequence for `fingerprint` and report to its waiters.
    async fn drive(&self, fingerprint: String, description: RequestDescription) {
        let mut end = EndOfBroadcast {
            inner: self,
            fingerprint: &fingerprint,
            settled: false,
        };

        let outcome = self.fetch(&fingerprint, &description).await;
        if let Err(e) = &outcome {
            error!(url = %description.url, error = %e, "Request failed");
            self.stats.record_failure();
        }

        self.broadcast(&fingerprint, &outcome);
        end.settled = true;
    }

    async fn fetch(&self, fingerprint: &str, description: &RequestDescription) -> Outcome {
        let start = Instant::now();

        if let Some(value) = self.cache.get(fingerprint, start) {
            debug!(url = %description.url, "Serving cached response");
            return Ok(value);
        }

        self.stats.record_transport_call(&description.url);
        let raw = self
            .transport
            .perform(description)
            .await
            .map_err(normalize::classify)?;

        let elapsed = start.elapsed();
        if elapsed < self.min_latency {
            tokio::time::sleep(self.min_latency - elapsed).await;
        }

        let payload = normalize::unwrap_payload(raw);
        self.cache.set(fingerprint, payload.clone(), Instant::now());
        debug!(cached = self.cache.len(), "Stored response");

        Ok(payload)
    }

    /// Deliver `outcome` to every waiter of `fingerprint`, in attachment order.
    fn broadcast(&self, fingerprint: &str, outcome: &Outcome) {
        let waiters = self.waiters.lock().remove(fingerprint).unwrap_or_default();
        for waiter in waiters {
            // A waiter whose caller went away has nobody to tell.
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Drop leftover waiters whose callers are gone and forget empty lists.
    ///
    /// Waiters that are still pending belong to a newer fetch sequence and are
    /// left alone.
    fn flush(&self, fingerprint: &str) {
        let mut waiters = self.waiters.lock();
        if let Some(list) = waiters.get_mut(fingerprint) {
            list.retain(|waiter| !waiter.is_closed());
            if list.is_empty() {
                waiters.remove(fingerprint);
            }
        }
    }
}

/// Final step of every fetch sequence, run on drop.
///
/// If the sequence never settled (the driving task panicked or was torn down),
/// the current waiters are failed instead of left hanging.
struct EndOfBroadcast<'a> {
    inner: &'a Inner,
    fingerprint: &'a str,
    settled: bool,
}

impl Drop for EndOfBroadcast<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.inner.broadcast(
                self.fingerprint,
                &Err(RequestError::Network(
                    "request was aborted before completing".to_string(),
                )),
            );
        }
        self.inner.flush(self.fingerprint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportFailure;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTransport {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn perform(
            &self,
            _description: &RequestDescription,
        ) -> std::result::Result<Value, TransportFailure> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            Ok(json!({"status": 200, "data": {"call": n}}))
        }
    }

    fn service(delay: Duration) -> (ApiService, Arc<CountingTransport>) {
        let transport = Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
            delay,
        });
        let service = ApiService::new(transport.clone(), &DispatchConfig::default());
        (service, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn registration_happens_at_call_time() {
        let (service, _) = service(Duration::from_millis(10));
        let description = RequestDescription::get("/api/overview");

        let first = service.request_value(description.clone());
        let second = service.request_value(description.clone());
        assert_eq!(service.waiting(&description), 2);

        assert_eq!(first.await.expect("first"), json!({"call": 1}));
        assert_eq!(second.await.expect("second"), json!({"call": 1}));
        assert_eq!(service.waiting(&description), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_map_is_empty_after_completion() {
        let (service, transport) = service(Duration::from_millis(10));
        service
            .request_value(RequestDescription::get("/api/a"))
            .await
            .expect("request");

        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.stats().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_rider_does_not_disturb_others() {
        let (service, transport) = service(Duration::from_millis(10));
        let description = RequestDescription::get("/api/a");

        let driver = service.request_value(description.clone());
        drop(service.request_value(description.clone()));
        let rider = service.request_value(description.clone());

        assert_eq!(driver.await.expect("driver"), json!({"call": 1}));
        assert_eq!(rider.await.expect("rider"), json!({"call": 1}));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "runtime")]
    fn request_outside_runtime_panics() {
        let transport = Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });
        let service = ApiService::new(transport, &DispatchConfig::default());
        drop(service.request_value(RequestDescription::get("/api/a")));
    }

    #[tokio::test(start_paused = true)]
    async fn flush_keeps_pending_waiters() {
        let (service, _) = service(Duration::from_millis(10));
        let description = RequestDescription::get("/api/a");
        let fingerprint = description.fingerprint();

        let (closed, closed_rx) = oneshot::channel();
        drop(closed_rx);
        let (open, _open_rx) = oneshot::channel();
        service
            .inner
            .waiters
            .lock()
            .insert(fingerprint.clone(), vec![closed, open]);

        service.inner.flush(&fingerprint);
        assert_eq!(service.waiting(&description), 1);
    }
}
