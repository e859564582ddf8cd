//! Gateway configuration from `COURIER_*` environment variables

use anyhow::{anyhow, bail, Context, Result};
use courier_core::RoutingGrammar;
use std::path::PathBuf;
use std::time::Duration;

/// Where service names are looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrySource {
    /// Kubernetes `Service` objects in one namespace
    Kubernetes { namespace: String },
    /// A YAML file listing services and their port mappings
    Static { path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub port: u16,
    pub proxy_host: String,
    pub grammar: RoutingGrammar,
    pub registry: RegistrySource,
    pub upstream_timeout: Duration,
    pub log_format: LogFormat,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = match var("COURIER_PORT") {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .with_context(|| format!("COURIER_PORT is not a valid port: {}", value))?,
            None => 8080,
        };

        let proxy_host = var("COURIER_PROXY_HOST").unwrap_or_else(|| "localhost".to_string());

        let grammar = match var("COURIER_ROUTING") {
            Some(value) => value
                .parse::<RoutingGrammar>()
                .map_err(|e| anyhow!("COURIER_ROUTING: {}", e))?,
            None => RoutingGrammar::default(),
        };

        let registry = match var("COURIER_REGISTRY").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("kubernetes") | Some("k8s") => RegistrySource::Kubernetes {
                namespace: var("COURIER_NAMESPACE").unwrap_or_else(|| "default".to_string()),
            },
            Some("static") => RegistrySource::Static {
                path: var("COURIER_REGISTRY_FILE")
                    .map(PathBuf::from)
                    .ok_or_else(|| anyhow!("COURIER_REGISTRY_FILE is required for the static registry"))?,
            },
            Some(other) => bail!("COURIER_REGISTRY: unknown registry {}", other),
        };

        let upstream_timeout = match var("COURIER_UPSTREAM_TIMEOUT_SECS") {
            Some(value) => {
                let secs = value.trim().parse::<u64>().with_context(|| {
                    format!("COURIER_UPSTREAM_TIMEOUT_SECS is not a number: {}", value)
                })?;
                if secs == 0 {
                    bail!("COURIER_UPSTREAM_TIMEOUT_SECS must be greater than zero");
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(30),
        };

        let log_format = match var("COURIER_LOG_FORMAT").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => bail!("COURIER_LOG_FORMAT: unknown format {}", other),
        };

        Ok(Self {
            port,
            proxy_host,
            grammar,
            registry,
            upstream_timeout,
            log_format,
        })
    }
}
