// HTTP(S) listener
//
// Plain HTTP goes through `axum::serve`. With TLS enabled, connections are
// accepted by hand, wrapped in rustls and served by hyper's auto (HTTP/1 or
// HTTP/2) connection builder, one task per connection.

use anyhow::{Context, Result};
use axum::Router;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tower::Service;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::tls::{self, TlsConfig};

/// How long in-flight TLS connections get to finish after a shutdown signal
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn serve(app: Router, config: &Config) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    if config.tls.enabled {
        let tls = tls::load(&config.tls)?;
        info!("Listening on https://{}", addr);
        serve_tls(listener, app, tls).await
    } else {
        if config.is_production() {
            warn!("TLS is disabled in production");
        }
        info!("Listening on http://{}", addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("Server stopped");
        Ok(())
    }
}

async fn serve_tls(listener: TcpListener, app: Router, tls: TlsConfig) -> Result<()> {
    let mut connections = JoinSet::new();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, remote_addr)) => {
                    let acceptor = tls.acceptor.clone();
                    let app = app.clone();

                    connections.spawn(async move {
                        let stream = match acceptor.accept(stream).await {
                            Ok(stream) => stream,
                            Err(e) => {
                                debug!(remote = %remote_addr, error = %e, "TLS handshake failed");
                                return;
                            }
                        };

                        let service = hyper::service::service_fn(move |request: Request<Incoming>| {
                            app.clone().call(request)
                        });

                        if let Err(e) = auto::Builder::new(TokioExecutor::new())
                            .serve_connection(TokioIo::new(stream), service)
                            .await
                        {
                            debug!(remote = %remote_addr, error = %e, "Connection closed with error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Error accepting connection");
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = &mut shutdown => break,
        }
    }

    let in_flight = connections.len();
    if in_flight > 0 {
        info!(in_flight, "Waiting for open connections to finish");
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(remaining = connections.len(), "Closing connections that did not finish in time");
            connections.abort_all();
        }
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
