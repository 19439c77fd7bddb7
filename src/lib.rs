//! Netdisco DNS/HTTP bridge: projects a Netdisco-like device inventory
//! into a DNS authoritative responder and an HTTP/JSON API, backed by a
//! background resolver/caching subsystem.

pub mod backend;
pub mod cache;
pub mod config;
pub mod device;
pub mod dns_handler;
pub mod encoder;
pub mod entry;
pub mod http_api;
pub mod metrics;
pub mod route;
pub mod scheduler;
pub mod search;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use backend::NetdiscoClient;
use config::AppConfig;
use dns_handler::DnsHandler;
use scheduler::Resolver;

/// Graceful-shutdown budget for each component.
const SHUTDOWN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Wires the resolver, the DNS server, the HTTP server, and the metrics
/// recorder together and runs them until `cancel` fires: one Scheduler
/// loop, the DNS listeners, the HTTP listener, all sharing one
/// cancellation token.
pub async fn run(cfg: AppConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let metrics_handle = if cfg.disable_reports_metrics {
        None
    } else {
        Some(metrics::install_recorder()?)
    };

    let backend = Arc::new(NetdiscoClient::new(&cfg.backend)?);
    let resolver = Arc::new(Resolver::with_metrics(
        cfg.entries.clone(),
        backend,
        cfg.workers.nb_workers,
        cfg.workers.refresh_interval(),
        !cfg.disable_reports_metrics,
    ));

    let mut tasks: tokio::task::JoinSet<anyhow::Result<()>> = tokio::task::JoinSet::new();

    {
        let resolver = Arc::clone(&resolver);
        let cancel = cancel.clone();
        tasks.spawn(async move {
            resolver.run(cancel).await;
            Ok(())
        });
    }

    if !cfg.dns_server.disable {
        let listen: SocketAddr = cfg.dns_server.listen.parse()?;
        let handler = DnsHandler::new(Arc::clone(&resolver));
        let cancel = cancel.clone();
        tasks.spawn(async move {
            tokio::select! {
                res = handler.serve(listen) => res,
                _ = cancel.cancelled() => Ok(()),
            }
        });
    } else {
        info!("dns server disabled by configuration");
    }

    if !cfg.http_server.disable {
        let listen: SocketAddr = cfg.http_server.listen_addr().parse()?;
        let state = http_api::ApiState {
            resolver: Arc::clone(&resolver),
            metrics: metrics_handle,
        };
        let router = http_api::router(state)
            .layer(tower_http::trace::TraceLayer::new_for_http());
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let listener = TcpListener::bind(listen).await?;
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await?;
            Ok(())
        });
    } else {
        info!("http server disabled by configuration");
    }

    let drain = async {
        while let Some(res) = tasks.join_next().await {
            match res {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "component exited with an error"),
                Err(e) => warn!(error = %e, "component task panicked"),
            }
        }
    };

    tokio::select! {
        _ = drain => {}
        _ = shutdown_watchdog(&cancel) => {
            warn!("components did not shut down within the grace period, aborting remaining tasks");
            tasks.shutdown().await;
        }
    }

    Ok(())
}

/// Resolves once `cancel` has fired and [`SHUTDOWN_TIMEOUT`] has since
/// elapsed; never resolves if `cancel` never fires.
async fn shutdown_watchdog(cancel: &CancellationToken) {
    cancel.cancelled().await;
    tokio::time::sleep(SHUTDOWN_TIMEOUT).await;
}
