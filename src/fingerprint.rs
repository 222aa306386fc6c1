//! Request descriptions and their fingerprints
//!
//! A fingerprint is the identity string used both as the cache key and as the
//! coalescing key. It is built from the method, target address, serialized body
//! and serialized query parameters, concatenated in that order and then
//! URL-escaped. The force flag never takes part in it.

use reqwest::Method;
use serde_json::{Map, Value};
use url::form_urlencoded;

/// Description of a single logical request.
///
/// Immutable once submitted to [`ApiService::request`](crate::ApiService::request).
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescription {
    /// HTTP method
    pub method: Method,
    /// Target address, absolute or relative to the configured base URL
    pub url: String,
    /// JSON body payload
    pub data: Option<Value>,
    /// Query parameters (a JSON object)
    pub params: Option<Map<String, Value>>,
    /// Bypass coalescing and the cache for this call only
    pub force_request: bool,
}

impl RequestDescription {
    /// Create a description for `method` on `url` with no body or parameters
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            data: None,
            params: None,
            force_request: false,
        }
    }

    /// `GET url`
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// `POST url`
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// `PUT url`
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    /// `DELETE url`
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Set the body payload
    #[must_use]
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Replace all query parameters
    #[must_use]
    pub fn params(mut self, params: Map<String, Value>) -> Self {
        self.params = Some(params);
        self
    }

    /// Add a single query parameter
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Mark this call as forced
    #[must_use]
    pub fn force(mut self) -> Self {
        self.force_request = true;
        self
    }

    /// Derive the fingerprint of this description.
    pub fn fingerprint(&self) -> String {
        fingerprint(self)
    }
}

/// Derive the fingerprint of `description`.
///
/// Deterministic and pure. Absent body or parameters serialize as `{}`, so a
/// description without a body and one with an explicit empty object share a
/// fingerprint.
pub fn fingerprint(description: &RequestDescription) -> String {
    let data = description
        .data
        .as_ref()
        .map_or_else(|| "{}".to_string(), Value::to_string);
    let params = description.params.as_ref().map_or_else(
        || "{}".to_string(),
        |params| Value::Object(params.clone()).to_string(),
    );

    let raw = [
        description.method.as_str(),
        description.url.as_str(),
        data.as_str(),
        params.as_str(),
    ]
    .concat();

    form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fingerprint_is_deterministic() {
        let description = RequestDescription::post("/api/instances")
            .data(json!({"name": "alpha", "tags": [1, 2]}))
            .param("page", 1);

        assert_eq!(description.fingerprint(), description.fingerprint());
        assert_eq!(description.fingerprint(), description.clone().fingerprint());
    }

    #[test]
    fn fingerprint_ignores_force_flag() {
        let plain = RequestDescription::get("/api/overview");
        let forced = plain.clone().force();
        assert_eq!(plain.fingerprint(), forced.fingerprint());
    }

    #[test]
    fn absent_body_matches_empty_object() {
        let absent = RequestDescription::get("/api/overview");
        let empty = RequestDescription::get("/api/overview").data(json!({}));
        assert_eq!(absent.fingerprint(), empty.fingerprint());
    }

    #[test]
    fn fingerprint_separates_methods_urls_and_params() {
        let base = RequestDescription::get("/api/files");
        assert_ne!(
            base.fingerprint(),
            RequestDescription::post("/api/files").fingerprint()
        );
        assert_ne!(
            base.fingerprint(),
            RequestDescription::get("/api/file").fingerprint()
        );
        assert_ne!(
            base.fingerprint(),
            base.clone().param("path", "/").fingerprint()
        );
    }

    #[test]
    fn fingerprint_is_url_escaped() {
        let key = RequestDescription::get("/api/files?x=1")
            .param("path", "a b")
            .fingerprint();
        assert!(!key.contains('/'));
        assert!(!key.contains(' '));
        assert!(!key.contains('{'));
        assert!(key.starts_with("GET%2Fapi%2Ffiles"));
    }

    #[test]
    fn object_key_order_does_not_matter() {
        let mut first = Map::new();
        first.insert("a".to_string(), json!(1));
        first.insert("b".to_string(), json!(2));
        let mut second = Map::new();
        second.insert("b".to_string(), json!(2));
        second.insert("a".to_string(), json!(1));

        assert_eq!(
            RequestDescription::get("/x").params(first).fingerprint(),
            RequestDescription::get("/x").params(second).fingerprint()
        );
    }
}
