//! Host based HTTP reverse proxy
//!
//! The [`Forwarder`] resolves each inbound request's `Host` header through a
//! [`courier_core::Resolver`], rewrites proxy headers, and streams the exchange
//! through a pluggable [`Transport`].
pub mod error;
pub mod forwarder;
pub mod headers;
pub mod http;
pub mod server;
pub mod transport;

pub use error::ProxyError;
pub use forwarder::Forwarder;
pub use http::{BoxError, ProxyBody};
pub use server::serve;
pub use transport::{HyperTransport, Transport};
