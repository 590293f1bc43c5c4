// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Built-in route handlers
//!
//! A handler replaces the proxy policy of a route entirely.  Reference one
//! from configuration with `handler = "<name>"` (plus an optional
//! `handler_config` table), or register your own constructor on a
//! [`HandlerFactory`] before building the proxy.
//!
//! | name     | description                                           |
//! |----------|-------------------------------------------------------|
//! | `health` | Combined proxy + upstream health document, see below. |

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{HttpMethod, ProxyCore, ProxyError, ProxyRequest, ProxyResponse, RouteHandler};
use crate::{debug_fmt, error_fmt, warn_fmt};

/// Constructor signature every named handler must implement.
pub type HandlerConstructor = fn(Value) -> Result<Arc<dyn RouteHandler>, ProxyError>;

/// Configuration for the health handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Upstream path probed, relative to the upstream root (not `/api`).
    #[serde(default = "default_upstream_path")]
    pub upstream_path: String,
}

fn default_upstream_path() -> String {
    "/health".to_string()
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            upstream_path: default_upstream_path(),
        }
    }
}

/// Reports the proxy as up and embeds whatever the upstream says about
/// itself.
///
/// * upstream 2xx → `200 {frontend: "ok", backend: <upstream json>}`
/// * upstream non-2xx → upstream status, `{frontend: "ok", backend: "error", backend_status}`
/// * upstream unreachable → `200 {frontend: "ok", backend: "unreachable", error}`
///
/// The API key is never sent to the health endpoint.
#[derive(Debug, Default)]
pub struct HealthCheckHandler {
    config: HealthCheckConfig,
}

impl HealthCheckHandler {
    pub fn new(config: HealthCheckConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RouteHandler for HealthCheckHandler {
    fn name(&self) -> &str {
        "health"
    }

    async fn handle(
        &self,
        core: &ProxyCore,
        request: ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        if request.method != HttpMethod::Get {
            return Ok(ProxyResponse::method_not_allowed());
        }

        let url = core.upstream().url(&self.config.upstream_path);
        debug_fmt!(request.route, "probing upstream health at {}", url);

        let upstream = match core
            .client()
            .get(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn_fmt!(request.route, "Upstream unreachable: {}", e);
                return Ok(ProxyResponse::json(
                    200,
                    json!({"frontend": "ok", "backend": "unreachable", "error": e.to_string()}),
                ));
            }
        };

        let status = upstream.status();
        if !status.is_success() {
            warn_fmt!(request.route, "Upstream health returned {}", status.as_u16());
            return Ok(ProxyResponse::json(
                status.as_u16(),
                json!({"frontend": "ok", "backend": "error", "backend_status": status.as_u16()}),
            ));
        }

        match upstream.json::<Value>().await {
            Ok(backend) => Ok(ProxyResponse::json(
                200,
                json!({"frontend": "ok", "backend": backend}),
            )),
            Err(e) => {
                error_fmt!(request.route, "Upstream health body unreadable: {}", e);
                Ok(ProxyResponse::json(
                    200,
                    json!({"frontend": "ok", "backend": "unreachable", "error": e.to_string()}),
                ))
            }
        }
    }
}

/// Creates handlers by name.
#[derive(Debug, Clone)]
pub struct HandlerFactory {
    registry: HashMap<String, HandlerConstructor>,
}

impl Default for HandlerFactory {
    fn default() -> Self {
        let mut factory = Self {
            registry: HashMap::new(),
        };
        factory.register("health", |config| {
            let config: HealthCheckConfig = if config.is_null() {
                HealthCheckConfig::default()
            } else {
                serde_json::from_value(config).map_err(|e| {
                    ProxyError::ConfigError(format!("Invalid health handler config: {e}"))
                })?
            };
            Ok(Arc::new(HealthCheckHandler::new(config)))
        });
        factory
    }
}

impl HandlerFactory {
    /// A factory knowing the built-in handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a handler constructor under `name`.
    pub fn register(&mut self, name: &str, ctor: HandlerConstructor) {
        self.registry.insert(name.to_string(), ctor);
    }

    pub fn create_handler(
        &self,
        name: &str,
        config: Value,
    ) -> Result<Arc<dyn RouteHandler>, ProxyError> {
        debug_fmt!("Handler", "Creating handler '{}' with config: {}", name, config);

        match self.registry.get(name) {
            Some(ctor) => ctor(config),
            None => {
                let err = ProxyError::ConfigError(format!("Unknown handler: {name}"));
                error_fmt!("Handler", "{}", err);
                Err(err)
            }
        }
    }
}
