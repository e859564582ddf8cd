//! Per-request forwarding: sanitize, resolve, send, relay

use crate::error::ProxyError;
use crate::headers::{forwarded_for, strip_hop_by_hop, X_FORWARDED_FOR, X_FORWARDED_HOST};
use crate::http::{boxed, error_response, BoxError, ProxyBody};
use crate::transport::Transport;
use courier_core::{CoreError, Resolver};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, HOST};
use hyper::{Request, Response, Uri, Version};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout as tokio_timeout;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Reverse proxy engine handling one inbound request at a time.
///
/// Shared across connections; holds no per-request state.
pub struct Forwarder {
    resolver: Arc<dyn Resolver>,
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl Forwarder {
    /// `timeout` bounds both resolution and waiting for the backend's response head
    pub fn new(resolver: Arc<dyn Resolver>, transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            resolver,
            transport,
            timeout,
        }
    }

    /// Handle an inbound request from `remote_addr`.
    ///
    /// Never fails: resolution and backend errors are logged and turned into
    /// error responses for this request only.
    pub async fn handle<B>(&self, request: Request<B>, remote_addr: &str) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let span = info_span!(
            "request",
            id = %Uuid::new_v4(),
            method = %request.method(),
            host = original_host(&request).as_deref().unwrap_or("-"),
            remote = %remote_addr,
        );

        async move {
            match self.forward(request, remote_addr).await {
                Ok(response) => response,
                Err(e) => {
                    let status = e.status_code();
                    if status.is_client_error() {
                        info!(status = status.as_u16(), "Rejected request: {}", e);
                    } else {
                        warn!(status = status.as_u16(), "Proxy error: {}", e);
                    }
                    error_response(status, &e.public_message())
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Forward a request to its resolved backend and return the backend's response
    pub async fn forward<B>(
        &self,
        request: Request<B>,
        remote_addr: &str,
    ) -> Result<Response<ProxyBody>, ProxyError>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let host = original_host(&request);
        let (mut parts, body) = request.into_parts();

        parts.version = Version::HTTP_11;

        let removed = strip_hop_by_hop(&mut parts.headers);
        debug!("Filtered {} hop-by-hop header values", removed);

        match forwarded_for(&parts.headers, remote_addr) {
            Some(chain) => {
                parts.headers.insert(X_FORWARDED_FOR, chain);
            }
            None => debug!("Remote address {:?} not splittable, X-Forwarded-For unchanged", remote_addr),
        }

        let host = host.ok_or_else(|| CoreError::RoutingKeyMalformed(String::new()))?;
        if let Ok(value) = HeaderValue::from_str(&host) {
            parts.headers.insert(X_FORWARDED_HOST, value);
        }

        let address = self
            .within("service resolution", self.resolver.resolve(&host))
            .await??;

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        parts.uri = Uri::builder()
            .scheme("http")
            .authority(address.as_str())
            .path_and_query(path_and_query)
            .build()?;
        parts.headers.insert(
            HOST,
            HeaderValue::from_str(address.as_str()).map_err(hyper::http::Error::from)?,
        );

        debug!(address = %address, uri = %parts.uri, "Sending request to backend");

        let outbound = Request::from_parts(parts, boxed(body));
        let response = self
            .within("backend response", self.transport.send(outbound))
            .await?
            .map_err(|source| ProxyError::Transport {
                address: address.clone(),
                source,
            })?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);

        info!(address = %address, status = parts.status.as_u16(), "Proxied request");
        Ok(Response::from_parts(parts, body))
    }

    async fn within<F: Future>(&self, stage: &'static str, future: F) -> Result<F::Output, ProxyError> {
        tokio_timeout(self.timeout, future)
            .await
            .map_err(|_| ProxyError::Timeout {
                stage,
                after: self.timeout,
            })
    }
}

/// The `Host` the caller addressed, from the header or an absolute-form target
fn original_host<B>(request: &Request<B>) -> Option<String> {
    request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|authority| authority.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use courier_core::{PortMapping, RegistryResolver, RoutingGrammar, ServiceRegistry};
    use http_body_util::{BodyExt, Empty, Full};
    use hyper::header::HeaderMap;
    use hyper::{Method, StatusCode};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Recorded {
        method: Method,
        uri: Uri,
        version: Version,
        headers: HeaderMap,
        body: Bytes,
    }

    enum Reply {
        Respond(StatusCode, Vec<(&'static str, &'static str)>, &'static str),
        Refused,
        Hang,
    }

    struct FakeTransport {
        reply: Reply,
        calls: Mutex<Vec<Recorded>>,
    }

    impl FakeTransport {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Recorded> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, request: Request<ProxyBody>) -> Result<Response<ProxyBody>, BoxError> {
            let (parts, body) = request.into_parts();
            let body = body.collect().await?.to_bytes();
            self.calls.lock().unwrap().push(Recorded {
                method: parts.method,
                uri: parts.uri,
                version: parts.version,
                headers: parts.headers,
                body,
            });

            match &self.reply {
                Reply::Respond(status, headers, body) => {
                    let mut response = Response::new(crate::http::full(*body));
                    *response.status_mut() = *status;
                    for (name, value) in headers {
                        response
                            .headers_mut()
                            .append(*name, HeaderValue::from_static(*value));
                    }
                    Ok(response)
                }
                Reply::Refused => Err("connection refused".into()),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Err("unreachable".into())
                }
            }
        }
    }

    async fn forwarder(transport: Arc<FakeTransport>, grammar: RoutingGrammar) -> Forwarder {
        let registry = ServiceRegistry::new();
        registry
            .register_service("web", vec![PortMapping::tcp(80, 32080), PortMapping::tcp(443, 32443)])
            .await
            .unwrap();
        registry.register_service("idle", vec![]).await.unwrap();

        let resolver = RegistryResolver::new(registry, "backend.local", grammar).unwrap();
        Forwarder::new(Arc::new(resolver), transport, Duration::from_millis(200))
    }

    fn ok_transport() -> Arc<FakeTransport> {
        FakeTransport::new(Reply::Respond(StatusCode::OK, vec![("content-type", "text/plain")], "hello"))
    }

    fn get(host: &str) -> Request<Empty<Bytes>> {
        Request::builder()
            .uri("/")
            .header(HOST, host)
            .body(Empty::new())
            .unwrap()
    }

    #[tokio::test]
    async fn test_forwards_to_resolved_address() {
        let transport = ok_transport();
        let forwarder = forwarder(transport.clone(), RoutingGrammar::ServiceOnly).await;

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/items?limit=10&sort=asc")
            .version(Version::HTTP_10)
            .header(HOST, "web.example.com")
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from_static(b"{\"name\":\"x\"}")))
            .unwrap();

        let response = forwarder.handle(request, "192.0.2.7:51000").await;
        assert_eq!(response.status(), StatusCode::OK);

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.method, Method::POST);
        assert_eq!(call.uri.to_string(), "http://backend.local:32080/api/items?limit=10&sort=asc");
        assert_eq!(call.version, Version::HTTP_11);
        assert_eq!(call.body, Bytes::from_static(b"{\"name\":\"x\"}"));
        assert_eq!(call.headers.get(HOST).unwrap(), "backend.local:32080");
        assert_eq!(call.headers.get(&X_FORWARDED_HOST).unwrap(), "web.example.com");
        assert_eq!(call.headers.get(&X_FORWARDED_FOR).unwrap(), "192.0.2.7");
    }

    #[tokio::test]
    async fn test_strips_hop_by_hop_headers() {
        let transport = ok_transport();
        let forwarder = forwarder(transport.clone(), RoutingGrammar::ServiceOnly).await;

        let request = Request::builder()
            .uri("/")
            .header(HOST, "web.example.com")
            .header("Connection", "close")
            .header("Keep-Alive", "timeout=5")
            .header("TE", "trailers")
            .header("Proxy-Authorization", "Basic Zm9vOmJhcg==")
            .header("Upgrade", "websocket")
            .header("Authorization", "Bearer token")
            .header("Accept", "text/html")
            .header("Accept", "application/json")
            .body(Empty::<Bytes>::new())
            .unwrap();

        forwarder.handle(request, "10.0.0.1:4000").await;

        let headers = &transport.calls()[0].headers;
        for name in crate::headers::HOP_BY_HOP_HEADERS {
            assert!(headers.get(*name).is_none(), "{} should be stripped", name);
        }
        assert_eq!(headers.get("authorization").unwrap(), "Bearer token");
        assert_eq!(headers.get_all("accept").iter().count(), 2);
    }

    #[tokio::test]
    async fn test_extends_forwarded_for_chain() {
        let transport = ok_transport();
        let forwarder = forwarder(transport.clone(), RoutingGrammar::ServiceOnly).await;

        let mut request = get("web.example.com");
        request
            .headers_mut()
            .insert(X_FORWARDED_FOR, HeaderValue::from_static("a, b"));
        forwarder.handle(request, "c:1234").await;

        let headers = &transport.calls()[0].headers;
        assert_eq!(headers.get_all(&X_FORWARDED_FOR).iter().count(), 1);
        assert_eq!(headers.get(&X_FORWARDED_FOR).unwrap(), "a, b, c");
    }

    #[tokio::test]
    async fn test_forwarded_for_chain_is_forwarded_verbatim() {
        let transport = ok_transport();
        let forwarder = forwarder(transport.clone(), RoutingGrammar::ServiceOnly).await;

        let mut request = get("web.example.com");
        request
            .headers_mut()
            .insert(X_FORWARDED_FOR, HeaderValue::from_bytes(b"10.0.0.9, \xfeproxy").unwrap());
        forwarder.handle(request, "c:1234").await;

        let headers = &transport.calls()[0].headers;
        assert_eq!(
            headers.get(&X_FORWARDED_FOR).unwrap().as_bytes(),
            b"10.0.0.9, \xfeproxy, c"
        );
    }

    #[tokio::test]
    async fn test_malformed_remote_leaves_forwarded_for() {
        let transport = ok_transport();
        let forwarder = forwarder(transport.clone(), RoutingGrammar::ServiceOnly).await;

        let mut request = get("web.example.com");
        request
            .headers_mut()
            .insert(X_FORWARDED_FOR, HeaderValue::from_static("a"));
        let response = forwarder.handle(request, "not-an-endpoint").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(transport.calls()[0].headers.get(&X_FORWARDED_FOR).unwrap(), "a");
    }

    #[tokio::test]
    async fn test_relays_response() {
        let transport = FakeTransport::new(Reply::Respond(
            StatusCode::CREATED,
            vec![
                ("set-cookie", "a=1"),
                ("set-cookie", "b=2"),
                ("x-backend", "web"),
                ("connection", "close"),
            ],
            "created",
        ));
        let forwarder = forwarder(transport.clone(), RoutingGrammar::ServiceOnly).await;

        let response = forwarder.handle(get("web.example.com"), "10.0.0.1:4000").await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get_all("set-cookie").iter().count(), 2);
        assert_eq!(response.headers().get("x-backend").unwrap(), "web");
        assert!(response.headers().get("connection").is_none());

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"created"));
    }

    #[tokio::test]
    async fn test_unknown_service_is_bad_gateway() {
        let transport = ok_transport();
        let forwarder = forwarder(transport.clone(), RoutingGrammar::ServiceOnly).await;

        let response = forwarder.handle(get("ghost.example.com"), "10.0.0.1:4000").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_service_without_ports_is_bad_gateway() {
        let transport = ok_transport();
        let forwarder = forwarder(transport.clone(), RoutingGrammar::ServiceOnly).await;

        let response = forwarder.handle(get("idle.example.com"), "10.0.0.1:4000").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_host_is_bad_request() {
        let transport = ok_transport();
        let forwarder = forwarder(transport.clone(), RoutingGrammar::ServiceOnly).await;

        let response = forwarder.handle(get("???.example.com"), "10.0.0.1:4000").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_host_is_bad_request() {
        let transport = ok_transport();
        let forwarder = forwarder(transport.clone(), RoutingGrammar::ServiceOnly).await;

        let request = Request::builder().uri("/").body(Empty::<Bytes>::new()).unwrap();
        let response = forwarder.handle(request, "10.0.0.1:4000").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_port_segment_routing() {
        let transport = ok_transport();
        let forwarder = forwarder(transport.clone(), RoutingGrammar::ServiceAndPort).await;

        let response = forwarder.handle(get("web.443.example.com"), "10.0.0.1:4000").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(transport.calls()[0].uri.authority().unwrap().as_str(), "backend.local:32443");

        let response = forwarder.handle(get("web.8443.example.com"), "10.0.0.1:4000").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_bad_gateway() {
        let transport = FakeTransport::new(Reply::Refused);
        let forwarder = forwarder(transport.clone(), RoutingGrammar::ServiceOnly).await;

        for _ in 0..2 {
            let response = forwarder.handle(get("web.example.com"), "10.0.0.1:4000").await;
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        }
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_backend_timeout_is_gateway_timeout() {
        let transport = FakeTransport::new(Reply::Hang);
        let forwarder = forwarder(transport.clone(), RoutingGrammar::ServiceOnly).await;

        let response = forwarder.handle(get("web.example.com"), "10.0.0.1:4000").await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_forward_reports_error_kind() {
        let forwarder = forwarder(ok_transport(), RoutingGrammar::ServiceOnly).await;

        let Err(err) = forwarder
            .forward(get("ghost.example.com"), "10.0.0.1:4000")
            .await
        else {
            panic!("expected resolution failure");
        };
        assert!(matches!(err, ProxyError::Resolve(CoreError::ServiceNotFound(_))));
    }
}
