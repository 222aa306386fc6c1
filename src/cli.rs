//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};

use crate::fingerprint::RequestDescription;
use crate::{Error, Result};

/// Request coalescer - one network call for many identical requests
#[derive(Parser, Debug)]
#[command(name = "request-coalescer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "REQUEST_COALESCER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "REQUEST_COALESCER_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "REQUEST_COALESCER_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Issue identical requests concurrently and report how many calls were made
    Fetch(FetchArgs),
}

/// Arguments of the `fetch` subcommand
#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Target address (absolute, or relative to `http.base_url`)
    #[arg(required = true)]
    pub url: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// JSON body
    #[arg(short, long)]
    pub data: Option<String>,

    /// Query parameter as `key=value` (repeatable)
    #[arg(short, long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Bypass coalescing and the cache
    #[arg(long)]
    pub force: bool,

    /// Number of identical requests issued at once
    #[arg(short = 'n', long, default_value_t = 1)]
    pub concurrency: usize,
}

impl FetchArgs {
    /// Build the request description these arguments describe
    pub fn description(&self) -> Result<RequestDescription> {
        let method = self
            .method
            .to_ascii_uppercase()
            .parse::<reqwest::Method>()
            .map_err(|e| Error::Config(format!("Invalid method {}: {e}", self.method)))?;

        let mut description = RequestDescription::new(method, self.url.clone());

        if let Some(data) = &self.data {
            description = description.data(serde_json::from_str(data)?);
        }

        if !self.params.is_empty() {
            let mut params = Map::new();
            for pair in &self.params {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    Error::Config(format!("Invalid parameter {pair}: expected KEY=VALUE"))
                })?;
                params.insert(key.to_string(), Value::String(value.to_string()));
            }
            description = description.params(params);
        }

        if self.force {
            description = description.force();
        }

        Ok(description)
    }
}
