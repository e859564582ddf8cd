//! Connection accept loop

use crate::forwarder::Forwarder;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::tokio::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Serve HTTP/1 connections from `listener` until `shutdown` completes.
///
/// Each connection runs on its own task. Dropping a connection drops any
/// in-flight backend exchange along with it.
pub async fn serve<S>(listener: TcpListener, forwarder: Arc<Forwarder>, shutdown: S)
where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let (stream, peer_addr) = tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, no longer accepting connections");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Error accepting connection: {}", e);
                    continue;
                }
            },
        };

        let io = TokioIo::new(stream);
        let forwarder = forwarder.clone();
        let remote_addr = peer_addr.to_string();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let forwarder = forwarder.clone();
                let remote_addr = remote_addr.clone();
                async move { Ok::<_, Infallible>(forwarder.handle(req, &remote_addr).await) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Error serving connection from {}: {}", peer_addr, e);
            }
        });
    }
}
