//! Resolution of a `Host` header to a backend address

use crate::registry::{PortMapping, Registry};
use crate::routing::{RoutingGrammar, RoutingKey, RoutingMatcher};
use crate::{CoreError, Result};
use async_trait::async_trait;
use std::fmt;
use tracing::debug;

/// A `host:port` backend address, valid for the single request it was resolved for
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedAddress(String);

impl ResolvedAddress {
    pub fn new(host: &str, port: u16) -> Self {
        if host.contains(':') && !host.starts_with('[') {
            Self(format!("[{}]:{}", host, port))
        } else {
            Self(format!("{}:{}", host, port))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ResolvedAddress> for String {
    fn from(address: ResolvedAddress) -> Self {
        address.0
    }
}

/// Maps the `Host` header of an inbound request to a backend address
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<ResolvedAddress>;
}

/// Resolver backed by a service registry
///
/// Every resolved address points at `proxy_host`, on the port the registry
/// publishes for the requested service.
pub struct RegistryResolver<R> {
    registry: R,
    proxy_host: String,
    matcher: RoutingMatcher,
}

impl<R: Registry> RegistryResolver<R> {
    pub fn new(registry: R, proxy_host: impl Into<String>, grammar: RoutingGrammar) -> Result<Self> {
        Ok(Self {
            registry,
            proxy_host: proxy_host.into(),
            matcher: grammar.matcher()?,
        })
    }

    /// Pick the published port for a routing key
    fn select_port(key: &RoutingKey, ports: &[PortMapping]) -> Result<u16> {
        if ports.is_empty() {
            return Err(CoreError::NoPortMapping(key.service.clone()));
        }

        match key.port {
            None => Ok(ports[0].host_port),
            Some(requested) => ports
                .iter()
                .find(|mapping| mapping.container_port == requested)
                .map(|mapping| mapping.host_port)
                .ok_or_else(|| CoreError::PortNotPublished {
                    service: key.service.clone(),
                    port: requested,
                }),
        }
    }
}

#[async_trait]
impl<R: Registry> Resolver for RegistryResolver<R> {
    async fn resolve(&self, host: &str) -> Result<ResolvedAddress> {
        let key = self.matcher.parse(host)?;

        let service = self
            .registry
            .lookup(&key.service)
            .await?
            .ok_or_else(|| CoreError::ServiceNotFound(key.service.clone()))?;

        let port = Self::select_port(&key, &service.ports)?;
        let address = ResolvedAddress::new(&self.proxy_host, port);

        debug!(routing_key = %key, address = %address, "Resolved backend");
        Ok(address)
    }
}
