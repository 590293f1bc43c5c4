// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Minimal CLI wrapper around the library.
//!
//!  `courtside proxy` (default) serves the API proxy.
//!  `courtside watch` polls a running proxy and logs every scoreboard update.
//!
//!  Configuration comes from `COURTSIDE_*` environment variables and, when
//!  set, the file named by `COURTSIDE_CONFIG_FILE`.

use std::env;
use std::error::Error;

use courtside::{Courtside, RefreshScheduler, SchedulerState};
use courtside::{error_fmt, info_fmt, warn_fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let mode = env::args().nth(1).unwrap_or_else(|| "proxy".to_string());

    let mut loader = Courtside::loader().with_env_vars();
    if let Ok(path) = env::var("COURTSIDE_CONFIG_FILE") {
        println!("Using configuration from {path}");
        loader = loader.with_config_file(&path);
    }

    let courtside = match loader.build() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to start Courtside: {e}");
            return Err(e.into());
        }
    };

    match mode.as_str() {
        "proxy" => {
            if let Err(e) = courtside.start().await {
                error_fmt!("Courtside", "Proxy server failed: {}", e);
                return Err(e.into());
            }
            info_fmt!("Courtside", "Proxy server stopped gracefully");
        }
        "watch" => {
            let scheduler = courtside.scheduler()?;
            watch(scheduler).await;
        }
        other => {
            eprintln!("Unknown mode '{other}'. Usage: courtside [proxy|watch]");
            return Err(format!("unknown mode {other}").into());
        }
    }

    Ok(())
}

async fn watch(scheduler: RefreshScheduler) {
    let mut updates = scheduler.subscribe();
    scheduler.start().await;
    report(&updates.borrow_and_update());

    let shutdown = courtside::server::shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                report(&updates.borrow_and_update());
            }
        }
    }

    scheduler.dispose();
    info_fmt!("Watch", "stopped");
}

fn report(state: &SchedulerState) {
    if let Some(error) = &state.error {
        warn_fmt!("Watch", "{}", error);
    }

    for game in &state.games {
        info_fmt!(
            "Watch",
            "{} {} - {} {}  {}",
            game.away_team.abbreviation,
            game.away_team.score,
            game.home_team.score,
            game.home_team.abbreviation,
            game.status_text
        );
    }

    info_fmt!(
        "Watch",
        "{} game(s), tier {}, next refresh in {}s",
        state.games.len(),
        state.tier,
        state.interval.as_secs()
    );
}
