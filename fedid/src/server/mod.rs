use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use std::convert::Infallible;
use std::net::SocketAddr;
use tracing::{info, warn};

use crate::commands::ServerCommand;
use crate::common::config::{VerifierConfig, VerifierMode};
use crate::common::http::build_http_client;

pub mod auth;
mod classifier;
mod handlers;
mod service;

pub use service::FederationService;

pub async fn run(args: ServerCommand) -> Result<()> {
    let config = VerifierConfig::from_server_command(&args)?;

    info!("🚀 Starting AWS Token Auth Server");
    info!("🔐 Verification mode: {}", config.mode.kind());
    match &config.mode {
        VerifierMode::AwsDirect { trusted_endpoints } => {
            for endpoint in trusted_endpoints {
                info!("🤝 Trusting STS endpoint {}", endpoint.host());
            }
        }
        VerifierMode::GcpDelegated { audience, sts_url } => {
            info!("🎯 GCP audience: {}", audience);
            info!("🌐 GCP STS: {}", sts_url);
        }
    }
    info!("⏱️  Upstream timeout: {}s", config.upstream_timeout.as_secs());

    let http_client = build_http_client();
    let service = FederationService::from_config(&config, http_client);

    let make_svc = make_service_fn(move |_conn| {
        let service = service.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let service = service.clone();
                async move { service.handle_request(req).await }
            }))
        }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let server = Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind {}", addr))?
        .serve(make_svc);

    info!("🌐 Listening on http://{}", addr);

    server
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("👋 Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
