//! Auth-token collaborator
//!
//! A [`TokenProvider`] supplies the current token; [`attach_token`] is the
//! interceptor that adds it to the outgoing query parameters. It runs inside the
//! transport, after fingerprinting, so tokens never change a fingerprint.

use std::env;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::AuthConfig;

/// Source of the token attached to every outgoing request
pub trait TokenProvider: Send + Sync {
    /// Current token, if one is available
    fn token(&self) -> Option<String>;
}

/// Provider that never yields a token
#[derive(Debug, Default, Clone, Copy)]
pub struct NoToken;

impl TokenProvider for NoToken {
    fn token(&self) -> Option<String> {
        None
    }
}

/// Provider holding a fixed token
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    /// Create a provider holding `token`
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.token.clone())
    }
}

impl AuthConfig {
    /// Resolve the configured token (`env:VAR_NAME` reads the environment)
    #[must_use]
    pub fn resolve_token(&self) -> Option<String> {
        self.token.as_ref().and_then(|token| {
            if let Some(var_name) = token.strip_prefix("env:") {
                env::var(var_name).ok()
            } else {
                Some(token.clone())
            }
        })
    }

    /// Build the token provider described by this configuration
    #[must_use]
    pub fn provider(&self) -> Arc<dyn TokenProvider> {
        match self.resolve_token() {
            Some(token) => Arc::new(StaticToken::new(token)),
            None => Arc::new(NoToken),
        }
    }
}

/// Insert the provider's token into `params` under `name`.
///
/// Creates the parameter object when absent. Leaves `params` untouched when the
/// provider has no token.
pub fn attach_token(
    params: Option<Map<String, Value>>,
    provider: &dyn TokenProvider,
    name: &str,
) -> Option<Map<String, Value>> {
    let Some(token) = provider.token() else {
        return params;
    };
    let mut params = params.unwrap_or_default();
    params.insert(name.to_string(), Value::String(token));
    Some(params)
}
