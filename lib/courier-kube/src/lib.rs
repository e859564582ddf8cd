//! Kubernetes service registry
pub mod registry;

pub use registry::KubeRegistry;
