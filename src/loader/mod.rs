// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level entry-point – "turn the key and go".
//!
//! The [`CourtsideLoader`] consumes configuration, initializes logging,
//! builds the route table and returns a [`Courtside`] holding a
//! [`ProxyCore`] and the [`ProxyServer`] around it.  The same configuration
//! also yields the watcher side: a [`RefreshScheduler`] polling the proxy.
//!
//! Provider priority, lowest first: config file, environment variables,
//! providers added with [`CourtsideLoader::with_provider`].


use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::client::{DEFAULT_BASE_URL, FetchError, GamesClient};
use crate::config::{Config, ConfigError, ConfigProvider, EnvConfigProvider, FileConfigProvider};
use crate::core::{ProxyCore, ProxyError, RouteHandler, UpstreamSettings};
use crate::handlers::{HandlerConstructor, HandlerFactory};
use crate::logging::{self, config::LoggingConfig};
use crate::router::{RouteConfig, RouteEntry, RouteTable};
use crate::scheduler::{RefreshScheduler, SchedulerConfig};
use crate::server::{ProxyServer, ServerConfig};
use crate::{info_fmt, warn_fmt};

/// Upstream used when `backend.url` is not configured.
pub const DEFAULT_BACKEND_URL: &str = "https://api.nbaoracle.com";

/// Errors that can occur during startup.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// Proxy error
    #[error("proxy error: {0}")]
    ProxyError(#[from] ProxyError),

    /// Client error
    #[error("client error: {0}")]
    FetchError(#[from] FetchError),
}

/// Builder for initializing and configuring Courtside.
#[derive(Debug)]
pub struct CourtsideLoader {
    config: Option<Config>,
    config_file_path: Option<String>,
    use_env_vars: bool,
    env_prefix: Option<String>,
    providers: Vec<Arc<dyn ConfigProvider>>,
    handlers: HandlerFactory,
    route_handlers: Vec<(String, Arc<dyn RouteHandler>)>,
}

impl Default for CourtsideLoader {
    fn default() -> Self {
        Self {
            config: None,
            config_file_path: None,
            use_env_vars: false,
            env_prefix: None,
            providers: Vec::new(),
            handlers: HandlerFactory::default(),
            route_handlers: Vec::new(),
        }
    }
}

impl CourtsideLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a ready-made configuration; file, env and provider settings are
    /// ignored.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a configuration file to load (toml, json or yaml).
    pub fn with_config_file(mut self, file_path: &str) -> Self {
        self.config_file_path = Some(file_path.to_string());
        self
    }

    /// Enable environment variable configuration.
    pub fn with_env_vars(mut self) -> Self {
        self.use_env_vars = true;
        self
    }

    /// Set a custom prefix for environment variables (default is `COURTSIDE_`).
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self.use_env_vars = true;
        self
    }

    /// Add a configuration provider on top of file and env.
    pub fn with_provider<P: ConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Attach a handler directly to `route`, replacing any configured entry.
    pub fn with_route_handler(mut self, route: &str, handler: Arc<dyn RouteHandler>) -> Self {
        self.route_handlers.push((route.to_string(), handler));
        self
    }

    /// Make a handler constructor available to `handler = "<name>"` entries.
    pub fn with_handler_constructor(mut self, name: &str, ctor: HandlerConstructor) -> Self {
        self.handlers.register(name, ctor);
        self
    }

    fn build_config(&mut self) -> Result<Config, LoaderError> {
        if let Some(config) = self.config.take() {
            return Ok(config);
        }

        let mut builder = Config::builder();

        if let Some(file_path) = &self.config_file_path {
            builder = builder.with_provider(FileConfigProvider::new(file_path)?);
        }

        if self.use_env_vars {
            let env_provider = match &self.env_prefix {
                Some(prefix) => EnvConfigProvider::new(prefix),
                None => EnvConfigProvider::default(),
            };
            builder = builder.with_provider(env_provider);
        }

        for provider in self.providers.drain(..) {
            builder = builder.with_shared_provider(provider);
        }

        Ok(builder.build())
    }

    /// Build and initialize Courtside.
    pub fn build(mut self) -> Result<Courtside, LoaderError> {
        let config = Arc::new(self.build_config()?);

        init_logging(&config);
        info_fmt!("Startup", "Courtside starting up (providers: {:?})", config.provider_names());

        let upstream = upstream_settings(&config)?;
        info_fmt!("Startup", "Upstream: {:?}", upstream);

        let mut routes = RouteTable::builtin();
        if let Some(entries) = config.get::<HashMap<String, RouteEntry>>("routes")? {
            routes.apply_entries(entries, &self.handlers)?;
        }
        for (route, handler) in self.route_handlers {
            routes.insert(route, RouteConfig::Custom(handler));
        }
        info_fmt!("Startup", "{} route(s) configured", routes.len());

        let core = Arc::new(ProxyCore::new(upstream, routes)?);

        let scheduler = scheduler_settings(&config)?;
        info_fmt!("Startup", "Scheduler: {:?}", scheduler);

        let server_config: ServerConfig = config.get_or_default("server", ServerConfig::default())?;
        let server = ProxyServer::new(server_config, core.clone());

        Ok(Courtside {
            config,
            server,
            core,
        })
    }
}

fn scheduler_settings(config: &Config) -> Result<SchedulerConfig, LoaderError> {
    let scheduler: SchedulerConfig = config.get_or_default("scheduler", SchedulerConfig::default())?;
    scheduler.validate()?;
    Ok(scheduler)
}

fn init_logging(config: &Config) {
    let override_level = env::var("RUST_LOG_LEVEL")
        .ok()
        .map(|level| logging::parse_level(&level));

    match config.get::<LoggingConfig>("logging") {
        Ok(Some(logging_config)) => logging::init_with_config(override_level, &logging_config),
        Ok(None) => logging::init(override_level),
        Err(e) => {
            logging::init(override_level);
            warn_fmt!("Startup", "Failed to read logging configuration: {}", e);
        }
    }
}

/// Read `backend.*` into [`UpstreamSettings`].
fn upstream_settings(config: &Config) -> Result<UpstreamSettings, LoaderError> {
    let url: String = config.get_or_default("backend.url", DEFAULT_BACKEND_URL.to_string())?;
    let timeout: u64 = config.get_or_default("backend.timeout", 30)?;

    let mut upstream = UpstreamSettings::new(url).with_timeout(Duration::from_secs(timeout));

    // An all-digit key set through the environment arrives as a number
    match config.get::<Value>("backend.api_key")? {
        Some(Value::String(key)) => upstream = upstream.with_api_key(key),
        Some(Value::Number(key)) => upstream = upstream.with_api_key(key.to_string()),
        Some(Value::Null) | None => {}
        Some(other) => {
            return Err(ConfigError::invalid("backend.api_key", format!("expected a string, got {other}")).into());
        }
    }

    Ok(upstream)
}

/// An initialized proxy plus the configuration it came from.
#[derive(Debug, Clone)]
pub struct Courtside {
    config: Arc<Config>,
    server: ProxyServer,
    core: Arc<ProxyCore>,
}

impl Courtside {
    /// Create a new loader for initializing Courtside.
    pub fn loader() -> CourtsideLoader {
        CourtsideLoader::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn core(&self) -> &Arc<ProxyCore> {
        &self.core
    }

    pub fn server(&self) -> &ProxyServer {
        &self.server
    }

    /// `client.base_url`, the proxy API root the watcher talks to.
    pub fn client_base_url(&self) -> Result<String, LoaderError> {
        Ok(self
            .config
            .get_or_default("client.base_url", DEFAULT_BASE_URL.to_string())?)
    }

    pub fn scheduler_config(&self) -> Result<SchedulerConfig, LoaderError> {
        scheduler_settings(&self.config)
    }

    /// A scheduler polling the configured proxy.  Not started.
    pub fn scheduler(&self) -> Result<RefreshScheduler, LoaderError> {
        let client = GamesClient::new(self.client_base_url()?)?;
        Ok(RefreshScheduler::new(Arc::new(client), self.scheduler_config()?))
    }

    /// Start the proxy server and block until shutdown.
    pub async fn start(&self) -> Result<(), LoaderError> {
        self.server.start().await.map_err(LoaderError::ProxyError)
    }
}
