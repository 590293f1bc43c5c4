// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Common test utilities for Courtside integration tests.

use courtside::{ProxyCore, ProxyServer, RouteTable, ServerConfig, UpstreamSettings};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A proxy serving on an ephemeral port until dropped or shut down.
#[allow(dead_code)]
pub struct RunningProxy {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Result<(), courtside::ProxyError>>>,
}

#[allow(dead_code)]
impl RunningProxy {
    pub async fn start(upstream: UpstreamSettings, routes: RouteTable) -> Self {
        let core = Arc::new(ProxyCore::new(upstream, routes).expect("proxy core"));
        let server = ProxyServer::new(ServerConfig::default(), core);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (tx, rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await
        });

        Self {
            addr,
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn api_base(&self) -> String {
        self.url("/api")
    }

    /// Signal shutdown and wait for the server to drain.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let result = tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("server did not stop in time")
                .expect("server task panicked");
            assert!(result.is_ok());
        }
    }
}

impl Drop for RunningProxy {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

/// A `games/today` payload with one game per `(id, status, status_text)`.
#[allow(dead_code)]
pub fn games_payload(games: &[(u64, &str, &str)]) -> Value {
    let games: Vec<Value> = games
        .iter()
        .map(|(id, status, status_text)| {
            json!({
                "id": id,
                "status": status,
                "status_text": status_text,
                "period": 1,
                "time_remaining": null,
                "home_team": {"id": 1, "name": "Celtics", "city": "Boston", "abbreviation": "BOS", "score": 12},
                "away_team": {"id": 2, "name": "Knicks", "city": "New York", "abbreviation": "NYK", "score": 10},
                "start_time": "2026-10-18T23:30:00Z"
            })
        })
        .collect();

    json!({"games": games, "last_updated": "2026-10-18T23:45:00Z"})
}

/// A port with nothing listening on it.
#[allow(dead_code)]
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr").port()
}
