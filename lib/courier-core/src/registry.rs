//! Service registry mapping service names to published ports

use crate::{CoreError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A port a service exposes, and the port it is published on at the proxy host
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "TCP".to_string()
}

impl PortMapping {
    pub fn tcp(container_port: u16, host_port: u16) -> Self {
        Self {
            container_port,
            host_port,
            protocol: default_protocol(),
        }
    }
}

/// Information about a registered service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    /// Published port mappings in the registry's natural order
    #[serde(default)]
    pub ports: Vec<PortMapping>,
}

/// External system of record for service names
///
/// Implementations must be safe to share across concurrent requests.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Look up a service by name. `Ok(None)` means the service is unknown.
    async fn lookup(&self, name: &str) -> Result<Option<ServiceInfo>>;
}

/// On-disk format for a static registry
#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    services: Vec<ServiceInfo>,
}

/// ServiceRegistry keeps services and their port mappings in memory
pub struct ServiceRegistry {
    services: Arc<RwLock<HashMap<String, ServiceInfo>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Build a registry from a YAML document of the form `services: [{name, ports}]`
    pub fn from_yaml(document: &str) -> Result<Self> {
        let file: RegistryFile = serde_yaml::from_str(document)?;

        let mut services = HashMap::with_capacity(file.services.len());
        for mut service in file.services {
            service.name = service.name.to_ascii_lowercase();
            if service.name.is_empty() {
                return Err(CoreError::InvalidConfiguration(
                    "service with empty name".to_string(),
                ));
            }
            if services.contains_key(&service.name) {
                return Err(CoreError::InvalidConfiguration(format!(
                    "duplicate service: {}",
                    service.name
                )));
            }
            services.insert(service.name.clone(), service);
        }

        Ok(Self {
            services: Arc::new(RwLock::new(services)),
        })
    }

    /// Load a static registry file
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let document = tokio::fs::read_to_string(path).await?;
        let registry = Self::from_yaml(&document)?;
        info!(
            "Loaded {} services from {}",
            registry.service_count().await,
            path.display()
        );
        Ok(registry)
    }

    /// Register or update a service
    pub async fn register_service(&self, name: &str, ports: Vec<PortMapping>) -> Result<()> {
        let name = name.to_ascii_lowercase();

        let mut services = self.services.write().await;
        services.insert(
            name.clone(),
            ServiceInfo {
                name: name.clone(),
                ports,
            },
        );

        debug!("Registered service: {}", name);
        Ok(())
    }

    /// Get service information
    pub async fn get_service(&self, name: &str) -> Result<ServiceInfo> {
        let name = name.to_ascii_lowercase();

        let services = self.services.read().await;
        services
            .get(&name)
            .cloned()
            .ok_or(CoreError::ServiceNotFound(name))
    }

    /// List all services
    pub async fn list_services(&self) -> Vec<ServiceInfo> {
        let services = self.services.read().await;
        services.values().cloned().collect()
    }

    /// Deregister a service
    pub async fn deregister_service(&self, name: &str) -> Result<()> {
        let name = name.to_ascii_lowercase();

        let mut services = self.services.write().await;
        if services.remove(&name).is_none() {
            return Err(CoreError::ServiceNotFound(name));
        }
        debug!("Deregistered service: {}", name);
        Ok(())
    }

    /// Get count of registered services
    pub async fn service_count(&self) -> usize {
        let services = self.services.read().await;
        services.len()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Registry for ServiceRegistry {
    async fn lookup(&self, name: &str) -> Result<Option<ServiceInfo>> {
        let services = self.services.read().await;
        Ok(services.get(&name.to_ascii_lowercase()).cloned())
    }
}
