//! Configuration management

use std::{collections::HashMap, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::DEFAULT_RESPONSE_TTL;
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Coalescing and caching behaviour
    pub dispatch: DispatchConfig,
    /// HTTP transport configuration
    pub http: HttpConfig,
    /// Auth-token configuration
    pub auth: AuthConfig,
}

/// Coalescing dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum age at which a cached response may still be served
    #[serde(with = "humantime_serde")]
    pub response_ttl: Duration,
    /// Minimum perceived latency of a network call
    #[serde(with = "humantime_serde")]
    pub min_latency: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            response_ttl: DEFAULT_RESPONSE_TTL,
            min_latency: Duration::from_millis(100),
        }
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Base URL that relative target addresses are joined onto
    pub base_url: Option<String>,
    /// Request timeout enforced by the HTTP client
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Headers sent with every request
    pub headers: HashMap<String, String>,
    /// Environment files to load before resolving the auth token.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
}

fn default_headers() -> HashMap<String, String> {
    HashMap::from([("X-Requested-With".to_string(), "XMLHttpRequest".to_string())])
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            headers: default_headers(),
            env_files: Vec::new(),
        }
    }
}

/// Auth-token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Token attached to every request.
    /// Supports a literal value or `env:VAR_NAME`.
    pub token: Option<String>,
    /// Query parameter the token is sent in
    pub query_param: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token: None,
            query_param: "token".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an optional YAML file and `REQUEST_COALESCER_*`
    /// environment variables (nested keys separated by `__`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("REQUEST_COALESCER_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.validate()?;

        Ok(config)
    }

    /// Reject values the dispatcher cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.response_ttl.is_zero() {
            return Err(Error::Config(
                "dispatch.response_ttl must be greater than zero".to_string(),
            ));
        }

        if let Some(base_url) = &self.http.base_url {
            Url::parse(base_url)
                .map_err(|e| Error::Config(format!("Invalid http.base_url {base_url}: {e}")))?;
        }

        if self.auth.query_param.is_empty() {
            return Err(Error::Config(
                "auth.query_param must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Load environment files into the process environment.
    /// Files that don't exist are skipped.
    fn load_env_files(&self) {
        for path_str in &self.http.env_files {
            let expanded = match (path_str.strip_prefix('~'), dirs::home_dir()) {
                (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
                _ => path_str.clone(),
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                    Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }
}
