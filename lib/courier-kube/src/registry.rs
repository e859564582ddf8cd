//! Registry lookups against Kubernetes `Service` objects
//!
//! A service is reachable through the proxy host when it publishes node ports.
//! Each `spec.ports[]` entry maps its service `port` to the `nodePort` exposed on
//! every node.

use async_trait::async_trait;
use courier_core::{CoreError, PortMapping, Registry, ServiceInfo};
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client};
use tracing::debug;

/// KubeRegistry resolves service names in a single namespace
pub struct KubeRegistry {
    client: Client,
    namespace: String,
}

impl KubeRegistry {
    /// Create a registry using the ambient kubeconfig or in-cluster configuration
    pub async fn new(namespace: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::with_client(client, namespace))
    }

    pub fn with_client(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    /// Published port mappings of a service, in declaration order
    pub fn port_mappings(service: &Service) -> Vec<PortMapping> {
        let Some(ports) = service.spec.as_ref().and_then(|spec| spec.ports.as_ref()) else {
            return Vec::new();
        };

        ports
            .iter()
            .filter_map(|port| {
                let container_port = u16::try_from(port.port).ok()?;
                let host_port = u16::try_from(port.node_port?).ok()?;
                Some(PortMapping {
                    container_port,
                    host_port,
                    protocol: port.protocol.clone().unwrap_or_else(|| "TCP".to_string()),
                })
            })
            .collect()
    }
}

#[async_trait]
impl Registry for KubeRegistry {
    async fn lookup(&self, name: &str) -> courier_core::Result<Option<ServiceInfo>> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), &self.namespace);

        let service = services
            .get_opt(name)
            .await
            .map_err(|e| CoreError::RegistryBackend(Box::new(e)))?;

        let Some(service) = service else {
            debug!("Service {}/{} not found", self.namespace, name);
            return Ok(None);
        };

        let ports = Self::port_mappings(&service);
        debug!(
            "Service {}/{} publishes {} ports",
            self.namespace,
            name,
            ports.len()
        );

        Ok(Some(ServiceInfo {
            name: name.to_string(),
            ports,
        }))
    }
}
