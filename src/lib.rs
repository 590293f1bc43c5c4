// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Courtside - a live scoreboard backend: caching API proxy plus an
//! adaptive refresh scheduler.
//!
//! Two halves share this crate:
//!
//! - **Proxy** ([`core`], [`router`], [`handlers`], [`server`]): serves
//!   `/api/{route}` by forwarding to the upstream sports-data service,
//!   injecting the API key and attaching CDN cache headers per route.
//!   Routes are looked up by exact match; a route can also be taken over
//!   completely by a [`RouteHandler`].
//! - **Watcher** ([`client`], [`scheduler`]): fetches `games/today` through
//!   the proxy and re-fetches on a cadence chosen from the games held: every
//!   5 s while a game is live, 30 s when one starts within 30 minutes, 5 min
//!   once all games are final, 1 min otherwise.
//!
//! # Configuration
//!
//! Configuration is layered: a file (TOML, JSON or YAML), then `COURTSIDE_*`
//! environment variables, then any custom [`ConfigProvider`].  Later layers
//! win.
//!
//! ```toml
//! [backend]
//! url = "https://api.nbaoracle.com"
//! api_key = "…"
//!
//! [routes."games/today"]
//! cache_duration = 30
//! stale_while_revalidate = 60
//!
//! [scheduler]
//! live_secs = 5
//! ```
//!
//! # Running the proxy
//!
//! ```rust,no_run
//! use courtside::Courtside;
//!
//! # async fn run() -> Result<(), courtside::LoaderError> {
//! let courtside = Courtside::loader()
//!     .with_config_file("courtside.toml")
//!     .with_env_vars()
//!     .build()?;
//! courtside.start().await
//! # }
//! ```

pub mod client;
pub mod config;
pub mod core;
pub mod handlers;
pub mod loader;
pub mod logging;
pub mod model;
pub mod router;
pub mod scheduler;
pub mod server;

// Re-export key types at the crate root for convenience
pub use client::{FetchError, GameSource, GamesClient};
pub use config::{Config, ConfigError, ConfigProvider, ConfigProviderExt};
pub use core::{
    ErrorEnvelope, HttpMethod, ProxyCore, ProxyError, ProxyRequest, ProxyResponse, RouteHandler,
    UpstreamSettings,
};
pub use handlers::{HandlerFactory, HealthCheckHandler};
pub use loader::{Courtside, CourtsideLoader, LoaderError};
pub use model::{Game, GameListResponse, GameStatus, Team};
pub use router::{RouteConfig, RouteEntry, RoutePolicy, RouteTable};
pub use scheduler::{PollTier, RefreshScheduler, SchedulerConfig, SchedulerState};
pub use server::{ProxyServer, ServerConfig};
