use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Routing key malformed: {0:?}")]
    RoutingKeyMalformed(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Service has no port mappings: {0}")]
    NoPortMapping(String),

    #[error("Port {port} is not published by service {service}")]
    PortNotPublished { service: String, port: u16 },

    #[error("Invalid registry configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Registry backend error: {0}")]
    RegistryBackend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Registry file error: {0}")]
    RegistryFile(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_yaml::Error),
}

impl CoreError {
    /// Whether the failure was caused by the caller's request rather than the backend side
    pub fn is_client_error(&self) -> bool {
        matches!(self, CoreError::RoutingKeyMalformed(_))
    }
}
