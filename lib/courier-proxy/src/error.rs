use crate::http::BoxError;
use courier_core::{CoreError, ResolvedAddress};
use hyper::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Per-request proxy failure. None of these are fatal to the process.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Resolution failed: {0}")]
    Resolve(#[from] CoreError),

    #[error("Backend request to {address} failed: {source}")]
    Transport {
        address: ResolvedAddress,
        #[source]
        source: BoxError,
    },

    #[error("Timed out waiting for {stage} after {after:?}")]
    Timeout { stage: &'static str, after: Duration },

    #[error("Invalid outbound request: {0}")]
    InvalidRequest(#[from] hyper::http::Error),
}

impl ProxyError {
    /// Status code reported to the caller
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Resolve(CoreError::RoutingKeyMalformed(_)) => StatusCode::BAD_REQUEST,
            ProxyError::Resolve(CoreError::InvalidConfiguration(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::Resolve(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Transport { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::InvalidRequest(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the caller
    pub fn public_message(&self) -> String {
        match self {
            ProxyError::Resolve(CoreError::RoutingKeyMalformed(host)) => {
                format!("cannot route host {:?}", host)
            }
            ProxyError::Resolve(CoreError::ServiceNotFound(name)) => {
                format!("service {} not found", name)
            }
            ProxyError::Resolve(CoreError::NoPortMapping(name)) => {
                format!("service {} has no published ports", name)
            }
            ProxyError::Resolve(CoreError::PortNotPublished { service, port }) => {
                format!("service {} does not publish port {}", service, port)
            }
            ProxyError::Resolve(_) => "service registry unavailable".to_string(),
            ProxyError::Transport { .. } => "error communicating with backend service".to_string(),
            ProxyError::Timeout { stage, .. } => format!("timed out waiting for {}", stage),
            ProxyError::InvalidRequest(_) => "failed to build backend request".to_string(),
        }
    }
}
