// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP server for the proxy.
//!
//! The server is a *thin* wrapper around **hyper-util**.  It owns the
//! listening socket(s), strips the `/api/` prefix and translates between
//! Hyper's body types and the [`ProxyRequest`] / [`ProxyResponse`] pair the
//! core works with.
//!
//! **Protocol support**
//! Uses `hyper_util::server::conn::auto::Builder`, so the same connection
//! transparently handles both HTTP/1.1 *and* HTTP/2.
//!
//! ## Surface
//! * `/api/{route}` → [`ProxyCore::process_request`]
//! * anything else → `404 {"error": "Not found", "path": …}`
//! * probes on `server.health_port`: `/health` and `/ready`

mod health;


pub use health::HealthServer;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{RwLock, oneshot};
use tokio::task::{Id, JoinError, JoinSet};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use crate::core::{ErrorEnvelope, HttpMethod, ProxyCore, ProxyError, ProxyRequest, ProxyResponse};

/// Prefix under which routes are exposed.
pub const API_PREFIX: &str = "/api/";

/// How long open connections get to finish after a shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Configuration for the HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Port to listen on for health/readiness checks
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_health_port() -> u16 {
    3001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            health_port: default_health_port(),
        }
    }
}

impl ServerConfig {
    fn socket_addr(&self, port: u16) -> Result<SocketAddr, ProxyError> {
        format!("{}:{}", self.host, port)
            .parse::<SocketAddr>()
            .map_err(|e| ProxyError::Other(format!("Invalid server address: {e}")))
    }
}

/// HTTP server for the proxy.
#[derive(Debug, Clone)]
pub struct ProxyServer {
    config: ServerConfig,
    core: Arc<ProxyCore>,
    /// Shutdown senders for each connection task
    shutdown_senders: Arc<RwLock<HashMap<Id, oneshot::Sender<()>>>>,
}

impl ProxyServer {
    pub fn new(config: ServerConfig, core: Arc<ProxyCore>) -> Self {
        Self {
            config,
            core,
            shutdown_senders: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn core(&self) -> &Arc<ProxyCore> {
        &self.core
    }

    /// Connections currently being served.
    pub async fn open_connections(&self) -> usize {
        self.shutdown_senders.read().await.len()
    }

    /// Bind the API and probe listeners and serve until Ctrl-C or SIGTERM.
    pub async fn start(&self) -> Result<(), ProxyError> {
        let addr = self.config.socket_addr(self.config.port)?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ProxyError::Other(format!("Failed to bind {addr}: {e}")))?;

        info!("Courtside proxy listening on http://{}", addr);

        let health_addr = self.config.socket_addr(self.config.health_port)?;
        let health_server = HealthServer::bind(health_addr).await?;
        health_server.set_ready();

        let result = self.serve(listener, shutdown_signal()).await;

        drop(health_server);
        result
    }

    /// Accept connections on `listener` until `shutdown` resolves, then
    /// drain open connections for at most [`SHUTDOWN_GRACE`].
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), ProxyError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let shutdown_senders = self.shutdown_senders.clone();
        let mut join_set = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Initiating graceful shutdown");
                    break;
                }
                accept = listener.accept() => {
                    // Finished connections are joined here so the set only
                    // holds live ones
                    while let Some(res) = join_set.try_join_next() {
                        log_task_result(res);
                    }

                    match accept {
                        Ok((stream, remote_addr)) => {
                            let core = self.core.clone();
                            let (tx, rx) = oneshot::channel();
                            let shutdown_senders_clone = shutdown_senders.clone();

                            // Held until the sender is registered, so a task
                            // that finishes early still finds its entry to remove
                            let mut senders = shutdown_senders.write().await;
                            let handle = join_set.spawn(async move {
                                let task_id = tokio::task::id();
                                debug!("Connection from {} on task {:?}", remote_addr, task_id);

                                let service = service_fn(move |req: Request<Incoming>| {
                                    handle_request(req, core.clone())
                                });
                                let io = TokioIo::new(stream);

                                let builder = AutoBuilder::new(TokioExecutor::new());
                                let mut conn = std::pin::pin!(builder.serve_connection(io, service));

                                tokio::select! {
                                    res = &mut conn => {
                                        if let Err(e) = res {
                                            log_connection_error(&*e);
                                        }
                                    }
                                    _ = rx => {
                                        debug!("Connection received shutdown signal, waiting for graceful close");
                                        conn.as_mut().graceful_shutdown();
                                        if let Err(e) = conn.await {
                                            log_connection_error(&*e);
                                        }
                                    }
                                }

                                shutdown_senders_clone.write().await.remove(&task_id);
                                debug!("Connection task {:?} completed", task_id);
                            });

                            senders.insert(handle.id(), tx);
                        }
                        Err(e) => error!("Accept error: {}", e),
                    }
                }
            }
        }

        drop(listener);
        info!("Shutting down; waiting for {} connection(s)", join_set.len());

        {
            let mut senders = shutdown_senders.write().await;
            for (task_id, sender) in senders.drain() {
                debug!("Sending shutdown signal to task {:?}", task_id);
                let _ = sender.send(());
            }
        }

        let start_time = tokio::time::Instant::now();
        let drain = async {
            while let Some(res) = join_set.join_next().await {
                log_task_result(res);
            }
        };

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, drain).await;
        match drained {
            Ok(()) => info!(
                "All connections drained gracefully in {:.1}s",
                start_time.elapsed().as_secs_f32()
            ),
            Err(_) => {
                warn!(
                    "Shutdown timed out after {} seconds, closing remaining connections",
                    SHUTDOWN_GRACE.as_secs()
                );
                join_set.shutdown().await;
            }
        }

        info!("Shutdown complete");
        Ok(())
    }
}

fn log_task_result(res: Result<(), JoinError>) {
    match res {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => debug!("Connection task cancelled"),
        Err(e) => error!("Connection task failed: {}", e),
    }
}

fn log_connection_error(e: &(dyn std::error::Error + Send + Sync)) {
    let msg = e.to_string();
    if !msg.contains("connection closed") && !msg.contains("connection reset") {
        error!("Connection error: {}", msg);
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Cannot install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

/// Route part of a request path: `/api/games/today/` → `games/today`.
pub(crate) fn route_from_path(path: &str) -> Option<&str> {
    let route = path.strip_prefix(API_PREFIX)?.trim_end_matches('/');
    (!route.is_empty()).then_some(route)
}

/// Serialize a [`ProxyResponse`] into a hyper response.
fn into_hyper_response(resp: ProxyResponse) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(&resp.body).unwrap_or_default();

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = hyper::StatusCode::from_u16(resp.status)
        .unwrap_or(hyper::StatusCode::INTERNAL_SERVER_ERROR);
    *response.headers_mut() = resp.headers;
    response
}

/// Handle an incoming HTTP request.
async fn handle_request(
    req: Request<Incoming>,
    core: Arc<ProxyCore>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_owned();
    debug!("Received request: {} {}", req.method(), path);

    let Some(route) = route_from_path(&path).map(str::to_owned) else {
        return Ok(into_hyper_response(ProxyResponse::error(
            404,
            ErrorEnvelope::new("Not found").with_path(&path),
        )));
    };

    let method = match HttpMethod::try_from(req.method()) {
        Ok(method) => method,
        Err(e) => {
            warn!("{} for {}", e, path);
            return Ok(into_hyper_response(ProxyResponse::method_not_allowed()));
        }
    };

    let bytes = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read request body for {}: {}", path, e);
            return Ok(into_hyper_response(ProxyResponse::error(
                400,
                ErrorEnvelope::new("Unreadable request body").with_path(&route),
            )));
        }
    };

    let mut request = ProxyRequest::new(method, route.as_str());
    if method != HttpMethod::Get && !bytes.is_empty() {
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(body) => request = request.with_body(body),
            Err(e) => {
                warn!("Invalid JSON body for {} {}: {}", method, path, e);
                return Ok(into_hyper_response(ProxyResponse::error(
                    400,
                    ErrorEnvelope::new("Invalid JSON body").with_path(&route),
                )));
            }
        }
    }

    let response = core.process_request(request).await;
    debug!("{} {} -> {}", method, path, response.status);
    Ok(into_hyper_response(response))
}
