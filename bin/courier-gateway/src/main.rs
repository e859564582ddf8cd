use anyhow::{Context, Result};
use courier_core::{RegistryResolver, Resolver, ServiceRegistry};
use courier_kube::KubeRegistry;
use courier_proxy::{serve, Forwarder, HyperTransport};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{GatewayConfig, LogFormat, RegistrySource};

#[tokio::main]
async fn main() -> Result<()> {
    let config = GatewayConfig::from_env()?;
    init_tracing(config.log_format);

    info!("Starting courier-gateway...");

    let resolver = build_resolver(&config).await?;
    info!(
        "Resolver initialized (routing: {}, proxy host: {})",
        config.grammar, config.proxy_host
    );

    let transport = Arc::new(HyperTransport::new(config.upstream_timeout));
    let forwarder = Arc::new(Forwarder::new(resolver, transport, config.upstream_timeout));
    info!(
        "Request forwarder initialized with {:?} upstream timeout",
        config.upstream_timeout
    );

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    serve(listener, forwarder, shutdown_signal()).await;

    info!("courier-gateway stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn build_resolver(config: &GatewayConfig) -> Result<Arc<dyn Resolver>> {
    let resolver: Arc<dyn Resolver> = match &config.registry {
        RegistrySource::Kubernetes { namespace } => {
            let registry = KubeRegistry::new(namespace.clone())
                .await
                .context("failed to connect to Kubernetes")?;
            info!("Using Kubernetes registry in namespace {}", namespace);
            Arc::new(RegistryResolver::new(
                registry,
                config.proxy_host.clone(),
                config.grammar,
            )?)
        }
        RegistrySource::Static { path } => {
            let registry = ServiceRegistry::from_file(path)
                .await
                .with_context(|| format!("failed to load registry file {}", path.display()))?;
            info!("Using static registry from {}", path.display());
            Arc::new(RegistryResolver::new(
                registry,
                config.proxy_host.clone(),
                config.grammar,
            )?)
        }
    };
    Ok(resolver)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, exiting...");
}
