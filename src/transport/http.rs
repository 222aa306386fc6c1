//! HTTP transport built on `reqwest`
//!
//! 2xx bodies are decoded as JSON (an empty body is `null`). Any other status
//! is reported as a failure that carries the decoded body, so the classifier
//! can look for the `{status, data}` envelope. Connection errors and timeouts
//! carry no response at all.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use super::Transport;
use crate::auth::{TokenProvider, attach_token};
use crate::config::{AuthConfig, HttpConfig};
use crate::error::TransportFailure;
use crate::fingerprint::RequestDescription;
use crate::{Error, Result};

/// HTTP transport with default headers and a token interceptor
pub struct HttpTransport {
    /// HTTP client
    client: Client,
    /// Base URL for relative target addresses
    base_url: Option<Url>,
    /// Headers sent with every request
    headers: HeaderMap,
    /// Token source for the interceptor
    token: Arc<dyn TokenProvider>,
    /// Query parameter the token is sent in
    token_param: String,
}

impl HttpTransport {
    /// Create a transport from configuration
    pub fn new(http: &HttpConfig, auth: &AuthConfig) -> Result<Self> {
        Self::with_token_provider(http, auth.provider(), &auth.query_param)
    }

    /// Create a transport with an explicit token provider
    pub fn with_token_provider(
        http: &HttpConfig,
        token: Arc<dyn TokenProvider>,
        token_param: &str,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(http.timeout)
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()?;

        let base_url = http
            .base_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| Error::Config(format!("Invalid base URL: {e}")))?;

        let mut headers = HeaderMap::new();
        for (key, value) in &http.headers {
            if let (Ok(k), Ok(v)) = (
                key.parse::<HeaderName>(),
                value.parse::<HeaderValue>(),
            ) {
                headers.insert(k, v);
            } else {
                warn!(header = %key, "Skipping invalid default header");
            }
        }

        Ok(Self {
            client,
            base_url,
            headers,
            token,
            token_param: token_param.to_string(),
        })
    }

    /// Resolve a target address against the base URL
    fn resolve_url(&self, target: &str) -> std::result::Result<Url, TransportFailure> {
        if let Ok(url) = Url::parse(target) {
            return Ok(url);
        }
        let Some(base) = &self.base_url else {
            return Err(TransportFailure::network(format!(
                "Relative URL {target} requires a base URL"
            )));
        };
        base.join(target)
            .map_err(|e| TransportFailure::network(format!("Invalid URL {target}: {e}")))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn perform(
        &self,
        description: &RequestDescription,
    ) -> std::result::Result<Value, TransportFailure> {
        let url = self.resolve_url(&description.url)?;
        let params = attach_token(
            description.params.clone(),
            self.token.as_ref(),
            &self.token_param,
        );

        let mut builder = self
            .client
            .request(description.method.clone(), url)
            .headers(self.headers.clone());
        if let Some(params) = &params {
            builder = builder.query(&query_pairs(params));
        }
        if let Some(data) = &description.data {
            builder = builder.json(data);
        }

        debug!(method = %description.method, url = %description.url, "Sending request");

        let response = builder
            .send()
            .await
            .map_err(|e| TransportFailure::network(e.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportFailure::network(format!("Failed to read response: {e}")))?;
        let body = decode_body(&bytes);

        if status.is_success() {
            Ok(body)
        } else {
            Err(failure_for(status, body))
        }
    }
}

fn failure_for(status: StatusCode, body: Value) -> TransportFailure {
    TransportFailure::with_response(
        format!("Request failed with status code {}", status.as_u16()),
        status.as_u16(),
        body,
    )
}

/// Decode a body as JSON, falling back to a JSON string for anything else
fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Flatten JSON query parameters into `key=value` pairs.
///
/// Nulls are skipped, arrays repeat the key as `key[]`, objects are sent as
/// compact JSON.
fn query_pairs(params: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len());
    for (key, value) in params {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                let key = format!("{key}[]");
                pairs.extend(
                    items
                        .iter()
                        .filter(|item| !item.is_null())
                        .map(|item| (key.clone(), scalar(item))),
                );
            }
            other => pairs.push((key.clone(), scalar(other))),
        }
    }
    pairs
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoToken;
    use serde_json::json;

    fn transport(base_url: Option<&str>) -> HttpTransport {
        let config = HttpConfig {
            base_url: base_url.map(str::to_string),
            ..HttpConfig::default()
        };
        HttpTransport::with_token_provider(&config, Arc::new(NoToken), "token")
            .expect("transport builds")
    }

    #[test]
    fn resolves_relative_targets_against_base() {
        let transport = transport(Some("http://localhost:23333/"));
        let url = transport.resolve_url("/api/overview").expect("url");
        assert_eq!(url.as_str(), "http://localhost:23333/api/overview");
    }

    #[test]
    fn absolute_targets_ignore_base() {
        let transport = transport(Some("http://localhost:23333/"));
        let url = transport.resolve_url("http://example.com/x").expect("url");
        assert_eq!(url.as_str(), "http://example.com/x");
    }

    #[test]
    fn relative_target_without_base_fails_without_response() {
        let failure = transport(None).resolve_url("/api").unwrap_err();
        assert!(failure.response.is_none());
    }

    #[test]
    fn decode_body_handles_json_text_and_empty() {
        assert_eq!(decode_body(br#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(decode_body(b"Bad Gateway"), json!("Bad Gateway"));
        assert_eq!(decode_body(b""), Value::Null);
    }

    #[test]
    fn query_pairs_flatten_values() {
        let params = json!({"page": 2, "q": "x", "skip": null, "ids": [1, 2], "flag": true});
        let Value::Object(params) = params else {
            unreachable!()
        };
        let pairs = query_pairs(&params);
        assert!(pairs.contains(&("page".to_string(), "2".to_string())));
        assert!(pairs.contains(&("q".to_string(), "x".to_string())));
        assert!(pairs.contains(&("flag".to_string(), "true".to_string())));
        assert!(pairs.contains(&("ids[]".to_string(), "1".to_string())));
        assert!(pairs.contains(&("ids[]".to_string(), "2".to_string())));
        assert!(!pairs.iter().any(|(k, _)| k == "skip"));
    }

    #[test]
    fn failure_carries_status_and_body() {
        let failure = failure_for(StatusCode::BAD_REQUEST, json!({"status": 400, "data": "bad"}));
        let response = failure.response.expect("response");
        assert_eq!(response.status, 400);
        assert_eq!(response.body["data"], json!("bad"));
    }
}
