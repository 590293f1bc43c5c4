// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Game snapshots as served by the upstream `games/today` route.
//!
//! Everything here is a read-only snapshot: a fetch produces a fresh
//! [`GameListResponse`] that replaces whatever was held before.


use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Lifecycle of a single game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStatus::Scheduled => write!(f, "scheduled"),
            GameStatus::InProgress => write!(f, "in_progress"),
            GameStatus::Final => write!(f, "final"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: u64,
    pub name: String,
    pub city: String,
    /// Three-letter code, used as the logo lookup key by the display.
    pub abbreviation: String,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: u64,
    pub status: GameStatus,
    /// "7:30 PM ET", "3rd Qtr 4:32", "Final"
    pub status_text: String,
    pub period: u32,
    pub time_remaining: Option<String>,
    pub home_team: Team,
    pub away_team: Team,
    pub start_time: Option<DateTime<Utc>>,
}

impl Game {
    pub fn is_live(&self) -> bool {
        self.status == GameStatus::InProgress
    }

    pub fn is_final(&self) -> bool {
        self.status == GameStatus::Final
    }

    pub fn is_scheduled(&self) -> bool {
        self.status == GameStatus::Scheduled
    }

    /// A scheduled game whose tip-off is in the future but no later than
    /// `now + window`.
    pub fn starts_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match (self.status, self.start_time) {
            (GameStatus::Scheduled, Some(start)) => start > now && start - now <= window,
            _ => false,
        }
    }
}

/// Envelope returned by `GET /api/games/today`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameListResponse {
    pub games: Vec<Game>,
    /// Freshness stamp set by the upstream, not by the client clock.
    pub last_updated: DateTime<Utc>,
}

/// A snapshot that breaks one of the model invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("duplicate game id {0}")]
    DuplicateId(u64),

    #[error("game {id} is {status} but status_text says '{text}'")]
    StatusTextMismatch {
        id: u64,
        status: GameStatus,
        text: String,
    },
}

impl GameListResponse {
    /// Check the invariants a display relies on: unique ids and a
    /// `status_text` that agrees with `status`.
    ///
    /// A scheduled game without a start time ("TBD") is accepted; see
    /// [`GameListResponse::undated`].
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut seen = HashSet::with_capacity(self.games.len());

        for game in &self.games {
            if !seen.insert(game.id) {
                return Err(ModelError::DuplicateId(game.id));
            }
            // "Final" and "Final/OT" belong to finished games only
            let says_final = game.status_text.trim().to_lowercase().starts_with("final");
            if says_final != game.is_final() {
                return Err(ModelError::StatusTextMismatch {
                    id: game.id,
                    status: game.status,
                    text: game.status_text.clone(),
                });
            }
        }

        Ok(())
    }

    /// Scheduled games the upstream has not dated yet.  They are never
    /// imminent.
    pub fn undated(&self) -> impl Iterator<Item = &Game> {
        self.games
            .iter()
            .filter(|g| g.is_scheduled() && g.start_time.is_none())
    }

    pub fn live_count(&self) -> usize {
        self.games.iter().filter(|g| g.is_live()).count()
    }
}
