//! Outbound transport used to reach backends

use crate::http::{boxed, BoxError, ProxyBody};
use async_trait::async_trait;
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

/// Sends one request to a backend and returns its response with a streaming body
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request<ProxyBody>) -> Result<Response<ProxyBody>, BoxError>;
}

/// Plain HTTP transport with connection pooling
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, ProxyBody>,
}

impl HyperTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_keepalive(Some(Duration::from_secs(30)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client }
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: Request<ProxyBody>) -> Result<Response<ProxyBody>, BoxError> {
        let response = self.client.request(request).await?;
        Ok(response.map(boxed))
    }
}
