// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Route table – exact-match lookup of per-route policy.
//!
//! Routes are flat strings such as `games/today`; nested paths are declared
//! with their `/` already in place and no prefix or tree matching is ever
//! performed.  A route missing from the table gets the default policy.
//!
//! ### Configuration
//! ```toml
//! [routes."games/today"]
//! cache_duration = 30
//! stale_while_revalidate = 60
//!
//! [routes."admin/stats"]
//! methods = ["GET", "POST"]
//! rate_limit_per_minute = 60   # parsed, not enforced
//!
//! [routes.health]
//! handler = "health"           # full override, see `handlers`
//! ```
//!
//! | field                    | default   |
//! |--------------------------|-----------|
//! | `cache_duration`         | `30`      |
//! | `stale_while_revalidate` | `60`      |
//! | `skip_api_key`           | `false`   |
//! | `methods`                | `["GET"]` |


use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ConfigError;
use crate::core::{HttpMethod, RouteHandler};
use crate::handlers::{HandlerFactory, HealthCheckHandler};

/// Cache, method and secret policy applied by the core to a proxied route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePolicy {
    /// `s-maxage` in seconds; `0` disables caching (`no-store`).
    pub cache_duration: u64,
    pub stale_while_revalidate: u64,
    /// Do not forward the API key (public upstream endpoints).
    pub skip_api_key: bool,
    /// Never empty.
    pub methods: Vec<HttpMethod>,
    /// Reserved for a future limiter; only logged today.
    pub rate_limit_per_minute: Option<u32>,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self {
            cache_duration: 30,
            stale_while_revalidate: 60,
            skip_api_key: false,
            methods: vec![HttpMethod::Get],
            rate_limit_per_minute: None,
        }
    }
}

impl RoutePolicy {
    pub fn allows(&self, method: HttpMethod) -> bool {
        self.methods.contains(&method)
    }

    /// Outbound `Cache-Control` value for a successful response.
    pub fn cache_control(&self) -> String {
        if self.cache_duration > 0 {
            format!(
                "s-maxage={}, stale-while-revalidate={}",
                self.cache_duration, self.stale_while_revalidate
            )
        } else {
            "no-store".to_string()
        }
    }
}

/// What a route resolves to.
#[derive(Debug, Clone)]
pub enum RouteConfig {
    /// Proxy to the upstream under this policy.
    Policy(RoutePolicy),
    /// Hand the request to a handler; no policy is applied.
    Custom(Arc<dyn RouteHandler>),
}

/// A route as written in configuration.  Missing fields fall back to the
/// default policy field by field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteEntry {
    #[serde(default)]
    pub cache_duration: Option<u64>,
    #[serde(default)]
    pub stale_while_revalidate: Option<u64>,
    #[serde(default)]
    pub skip_api_key: Option<bool>,
    #[serde(default)]
    pub methods: Option<Vec<HttpMethod>>,
    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,
    /// Name of a built-in handler; turns the route into a full override.
    #[serde(default)]
    pub handler: Option<String>,
    /// Free-form configuration passed to the handler.
    #[serde(default)]
    pub handler_config: serde_json::Value,
}

impl RouteEntry {
    /// Overlay this entry on `defaults`.
    pub fn to_policy(&self, route: &str, defaults: &RoutePolicy) -> Result<RoutePolicy, ConfigError> {
        let mut methods: Vec<HttpMethod> = Vec::new();
        for method in self.methods.as_ref().unwrap_or(&defaults.methods) {
            if !methods.contains(method) {
                methods.push(*method);
            }
        }
        if methods.is_empty() {
            return Err(ConfigError::invalid(
                format!("routes.{route}.methods"),
                "at least one method is required",
            ));
        }

        Ok(RoutePolicy {
            cache_duration: self.cache_duration.unwrap_or(defaults.cache_duration),
            stale_while_revalidate: self
                .stale_while_revalidate
                .unwrap_or(defaults.stale_while_revalidate),
            skip_api_key: self.skip_api_key.unwrap_or(defaults.skip_api_key),
            methods,
            rate_limit_per_minute: self.rate_limit_per_minute.or(defaults.rate_limit_per_minute),
        })
    }
}

/// Exact-match route lookup with a default policy fallback.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, RouteConfig>,
    default_policy: RoutePolicy,
}

impl RouteTable {
    /// An empty table: every route gets the default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// The routes the scoreboard ships with: a short cache for `games/today`
    /// and the combined health check on `health`.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.insert(
            "games/today",
            RouteConfig::Policy(RoutePolicy {
                cache_duration: 30,
                stale_while_revalidate: 60,
                ..RoutePolicy::default()
            }),
        );
        table.insert("health", RouteConfig::Custom(Arc::new(HealthCheckHandler::default())));
        table
    }

    pub fn with_default_policy(mut self, policy: RoutePolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn default_policy(&self) -> &RoutePolicy {
        &self.default_policy
    }

    /// Add or replace the configuration for `route`.
    pub fn insert(&mut self, route: impl Into<String>, config: RouteConfig) {
        let route = route.into();
        log::debug!("Registering route '{}'", route);
        self.routes.insert(route, config);
    }

    /// Apply configuration entries on top of the current table.
    pub fn apply_entries(
        &mut self,
        entries: HashMap<String, RouteEntry>,
        handlers: &HandlerFactory,
    ) -> Result<(), ConfigError> {
        for (route, entry) in entries {
            let config = match &entry.handler {
                Some(name) => RouteConfig::Custom(
                    handlers
                        .create_handler(name, entry.handler_config.clone())
                        .map_err(|e| ConfigError::invalid(format!("routes.{route}.handler"), e))?,
                ),
                None => RouteConfig::Policy(entry.to_policy(&route, &self.default_policy)?),
            };
            self.insert(route, config);
        }
        Ok(())
    }

    /// Resolve `route` by exact string match.
    pub fn resolve(&self, route: &str) -> RouteConfig {
        match self.routes.get(route) {
            Some(config) => {
                log::trace!("Route '{}' matched a configured entry", route);
                config.clone()
            }
            None => {
                log::trace!("Route '{}' not configured, using default policy", route);
                RouteConfig::Policy(self.default_policy.clone())
            }
        }
    }

    pub fn contains(&self, route: &str) -> bool {
        self.routes.contains_key(route)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
