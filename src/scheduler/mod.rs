// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Adaptive refresh scheduler.
//!
//! The scheduler owns the latest game snapshot and re-fetches it on a
//! cadence that follows the games themselves: fast while a game is live,
//! slower when one is about to start, slowest once everything is over.
//!
//! After every fetch, successful or not, the interval is recomputed from
//! the games currently held and exactly one timer is armed.  A failed fetch
//! keeps the previous games and only records the error.  Observers either
//! poll [`RefreshScheduler::snapshot`] or subscribe to a
//! [`tokio::sync::watch`] channel that is updated after each fetch.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use courtside::client::GamesClient;
//! # use courtside::scheduler::{RefreshScheduler, SchedulerConfig};
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = GamesClient::new("http://127.0.0.1:3000/api")?;
//! let scheduler = RefreshScheduler::new(Arc::new(client), SchedulerConfig::default());
//! scheduler.start().await;
//!
//! let mut updates = scheduler.subscribe();
//! while updates.changed().await.is_ok() {
//!     let state = updates.borrow().clone();
//!     println!("{} games, next poll in {:?}", state.games.len(), state.interval);
//! }
//! # Ok(())
//! # }
//! ```

mod tier;


pub use tier::{PollTier, SchedulerConfig, tier};

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::GameSource;
use crate::model::Game;
use crate::{debug_fmt, info_fmt, warn_fmt};

/// Source of "now" for tier selection.
pub trait Clock: fmt::Debug + Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// What observers see.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerState {
    /// Games from the last successful fetch.
    pub games: Vec<Game>,
    /// `true` until the first fetch settles.
    pub loading: bool,
    /// Message of the last failed fetch; cleared by the next success.
    pub error: Option<String>,
    /// Upstream freshness stamp of the last successful fetch.
    pub last_updated: Option<DateTime<Utc>>,
    pub tier: PollTier,
    /// Delay until the next scheduled fetch.
    pub interval: Duration,
}

impl SchedulerState {
    fn initial(config: &SchedulerConfig) -> Self {
        Self {
            games: Vec::new(),
            loading: true,
            error: None,
            last_updated: None,
            tier: PollTier::Idle,
            interval: config.interval(PollTier::Idle),
        }
    }
}

struct Inner {
    source: Arc<dyn GameSource>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    state: watch::Sender<SchedulerState>,
    timer: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl Inner {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    async fn refresh(self: &Arc<Self>) {
        if self.is_disposed() {
            return;
        }

        let result = self.source.fetch_games().await;

        // Disposed while the fetch was in flight: drop the result
        if self.is_disposed() {
            debug_fmt!("Scheduler", "discarding fetch result after dispose");
            return;
        }

        let now = self.clock.now();
        let config = &self.config;
        let mut tier_change = None;

        self.state.send_modify(|state| {
            match result {
                Ok(response) => {
                    state.games = response.games;
                    state.last_updated = Some(response.last_updated);
                    state.error = None;
                }
                Err(e) => {
                    warn_fmt!("Scheduler", "refresh failed: {}", e);
                    state.error = Some(e.to_string());
                }
            }
            state.loading = false;

            let next = tier(&state.games, now, config);
            if next != state.tier {
                tier_change = Some((state.tier, next));
            }
            state.tier = next;
            state.interval = config.interval(next);
        });

        if let Some((from, to)) = tier_change {
            info_fmt!("Scheduler", "polling tier {} -> {}", from, to);
        }

        self.reschedule();
    }

    /// Replace the pending timer with one for the current interval.
    fn reschedule(self: &Arc<Self>) {
        let interval = self.state.borrow().interval;
        let mut slot = self.timer.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = slot.take() {
            previous.abort();
        }
        if self.is_disposed() {
            return;
        }

        debug_fmt!("Scheduler", "next refresh in {:?}", interval);
        let weak: Weak<Inner> = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            if let Some(inner) = weak.upgrade() {
                // The fetch runs in its own task so that re-arming the timer
                // only ever aborts a sleeping timer, never a fetch.
                tokio::spawn(async move { inner.refresh().await });
            }
        }));
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut slot = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        debug_fmt!("Scheduler", "disposed");
    }
}

/// Periodically refreshes the game list from a [`GameSource`].
///
/// Dropping the scheduler disposes it.
pub struct RefreshScheduler {
    inner: Arc<Inner>,
}

impl RefreshScheduler {
    pub fn new(source: Arc<dyn GameSource>, config: SchedulerConfig) -> Self {
        Self::with_clock(source, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        source: Arc<dyn GameSource>,
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::initial(&config));
        Self {
            inner: Arc::new(Inner {
                source,
                clock,
                config,
                state,
                timer: Mutex::new(None),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Fetch immediately, then keep refreshing on the adaptive cadence.
    /// Must be called from within a tokio runtime.
    pub async fn start(&self) {
        info_fmt!("Scheduler", "starting with {:?}", self.inner.config);
        self.inner.refresh().await;
    }

    /// Fetch now.  The pending timer is replaced by one computed from the
    /// result, so the cadence restarts from this fetch.
    pub async fn refresh(&self) {
        self.inner.refresh().await;
    }

    /// Stop all future fetches.  A fetch already in flight completes but its
    /// result is discarded.  Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    pub fn snapshot(&self) -> SchedulerState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.inner.state.subscribe()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Whether a timer is armed and has not fired yet.
    pub fn has_pending_timer(&self) -> bool {
        let slot = self.inner.timer.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("source", &self.inner.source)
            .field("config", &self.inner.config)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}
