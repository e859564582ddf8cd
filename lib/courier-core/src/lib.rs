//! Core routing and service resolution for courier
//!
//! This library provides:
//! - Routing key grammar for extracting a service identity from a `Host` header
//! - The `Registry` capability and an in-memory `ServiceRegistry`
//! - The `Resolver` capability and `RegistryResolver`, which turns a host into a backend address

pub mod registry;
pub mod resolver;
pub mod routing;
pub mod error;

pub use registry::{PortMapping, Registry, ServiceInfo, ServiceRegistry};
pub use resolver::{RegistryResolver, ResolvedAddress, Resolver};
pub use routing::{RoutingGrammar, RoutingKey};
pub use error::{CoreError, Result};
