// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed access to the proxy's `games/today` route.
//!
//! One call, one request: there is no retry here.  Retrying is the
//! scheduler's job, through its regular cadence or a manual refresh.


use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::{debug_fmt, warn_fmt};
use crate::model::{GameListResponse, ModelError};

/// Default base URL of the proxy's API surface.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000/api";

/// Why a fetch did not produce a usable snapshot.
///
/// The `Display` text is what the scheduler exposes as its error message.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The proxy answered with a non-success status.
    #[error("Failed to fetch games: {status_text}")]
    Status { status: u16, status_text: String },

    /// The request never produced a response.
    #[error("Failed to fetch games: {0}")]
    Transport(#[from] reqwest::Error),

    /// A success status with a body that is not a game list.
    #[error("Failed to read games: {0}")]
    Decode(String),

    /// A well-formed game list that breaks the model invariants.
    #[error("Invalid games payload: {0}")]
    Invalid(#[from] ModelError),
}

/// Anything that can produce the current game list.
#[async_trait]
pub trait GameSource: fmt::Debug + Send + Sync {
    async fn fetch_games(&self) -> Result<GameListResponse, FetchError>;
}

/// HTTP implementation of [`GameSource`] talking to the proxy.
#[derive(Debug, Clone)]
pub struct GamesClient {
    http: reqwest::Client,
    base_url: String,
}

impl GamesClient {
    /// `base_url` is the proxy's API root, e.g. `http://127.0.0.1:3000/api`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn games_url(&self) -> String {
        format!("{}/games/today", self.base_url)
    }
}

#[async_trait]
impl GameSource for GamesClient {
    async fn fetch_games(&self) -> Result<GameListResponse, FetchError> {
        let url = self.games_url();
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                status_text: status
                    .canonical_reason()
                    .unwrap_or(status.as_str())
                    .to_string(),
            });
        }

        let bytes = response.bytes().await?;
        let games: GameListResponse =
            serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))?;
        games.validate()?;
        for game in games.undated() {
            warn_fmt!("client", "game {} is scheduled without a start time ({})", game.id, game.status_text);
        }

        debug_fmt!("client", "fetched {} games ({} live)", games.games.len(), games.live_count());
        Ok(games)
    }
}
