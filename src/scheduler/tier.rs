// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Polling tiers and the pure tier selection.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::ConfigError;
use crate::model::Game;

/// How eager the scheduler currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollTier {
    /// At least one game is being played.
    Live,
    /// A game tips off soon.
    Imminent,
    /// Every game of the day is over.
    Finished,
    /// Nothing noteworthy, or nothing loaded yet.
    Idle,
}

impl fmt::Display for PollTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollTier::Live => write!(f, "live"),
            PollTier::Imminent => write!(f, "imminent"),
            PollTier::Finished => write!(f, "finished"),
            PollTier::Idle => write!(f, "idle"),
        }
    }
}

/// Tier intervals and the "starts soon" window (`scheduler` key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_live_secs")]
    pub live_secs: u64,
    #[serde(default = "default_imminent_secs")]
    pub imminent_secs: u64,
    #[serde(default = "default_finished_secs")]
    pub finished_secs: u64,
    #[serde(default = "default_idle_secs")]
    pub idle_secs: u64,
    /// A scheduled game starting within this many minutes is imminent.
    #[serde(default = "default_imminent_window_mins")]
    pub imminent_window_mins: i64,
}

fn default_live_secs() -> u64 {
    5
}

fn default_imminent_secs() -> u64 {
    30
}

fn default_finished_secs() -> u64 {
    300
}

fn default_idle_secs() -> u64 {
    60
}

fn default_imminent_window_mins() -> i64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            live_secs: default_live_secs(),
            imminent_secs: default_imminent_secs(),
            finished_secs: default_finished_secs(),
            idle_secs: default_idle_secs(),
            imminent_window_mins: default_imminent_window_mins(),
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self, tier: PollTier) -> Duration {
        let secs = match tier {
            PollTier::Live => self.live_secs,
            PollTier::Imminent => self.imminent_secs,
            PollTier::Finished => self.finished_secs,
            PollTier::Idle => self.idle_secs,
        };
        Duration::from_secs(secs)
    }

    /// `None` when `imminent_window_mins` does not fit a [`ChronoDuration`].
    pub fn imminent_window(&self) -> Option<ChronoDuration> {
        ChronoDuration::try_minutes(self.imminent_window_mins)
    }

    /// Reject values the scheduler cannot run with: a zero interval would
    /// refetch in a tight loop and a window must be positive and in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("live_secs", self.live_secs),
            ("imminent_secs", self.imminent_secs),
            ("finished_secs", self.finished_secs),
            ("idle_secs", self.idle_secs),
        ];
        for (key, secs) in intervals {
            if secs == 0 {
                return Err(ConfigError::invalid(
                    format!("scheduler.{key}"),
                    "interval must be at least one second",
                ));
            }
        }

        if self.imminent_window_mins <= 0 || self.imminent_window().is_none() {
            return Err(ConfigError::invalid(
                "scheduler.imminent_window_mins",
                format!("window must be a positive number of minutes, got {}", self.imminent_window_mins),
            ));
        }

        Ok(())
    }
}

/// Pick the tier for `games` at `now`.  First matching rule wins:
///
/// 1. any game in progress → [`PollTier::Live`]
/// 2. any scheduled game starting in `(now, now + window]` → [`PollTier::Imminent`]
/// 3. a non-empty list of final games only → [`PollTier::Finished`]
/// 4. otherwise → [`PollTier::Idle`]
pub fn tier(games: &[Game], now: DateTime<Utc>, config: &SchedulerConfig) -> PollTier {
    if games.iter().any(Game::is_live) {
        return PollTier::Live;
    }

    let imminent = config
        .imminent_window()
        .is_some_and(|window| games.iter().any(|g| g.starts_within(now, window)));
    if imminent {
        return PollTier::Imminent;
    }

    if !games.is_empty() && games.iter().all(Game::is_final) {
        return PollTier::Finished;
    }

    PollTier::Idle
}
