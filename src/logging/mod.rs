// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Logging utilities for Courtside.
//!
//! Everything in the crate logs through the `log` facade.  By default the
//! facade is served by `env_logger`; when `logging.structured = true` a
//! `slog` drain (terminal or JSON) is installed and `slog_stdlog` bridges the
//! facade into it.

pub mod config;
pub mod structured;
mod wrapper;


use log::{LevelFilter, info};
use once_cell::sync::OnceCell;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use config::LoggingConfig;

static INIT: Once = Once::new();
static USING_STRUCTURED: AtomicBool = AtomicBool::new(false);
static GLOBAL_GUARD: OnceCell<slog_scope::GlobalLoggerGuard> = OnceCell::new();

fn level_name(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::Trace => "trace",
        LevelFilter::Debug => "debug",
        LevelFilter::Info => "info",
        LevelFilter::Warn => "warn",
        LevelFilter::Error => "error",
        LevelFilter::Off => "off",
    }
}

/// Parse a level name as used in `RUST_LOG_LEVEL` and `logging.level`.
pub fn parse_level(name: &str) -> LevelFilter {
    match name.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" | "warning" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Initialize `env_logger` with the specified level.
///
/// Only the first call in a process has any effect.
pub fn init(level: Option<LevelFilter>) {
    INIT.call_once(|| install_env_logger(level));
}

fn install_env_logger(level: Option<LevelFilter>) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level.map_or("info", level_name));

    // try_init: a test harness may already own the logger
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .format_target(true)
        .try_init();

    info!("Logging initialized at level: {}", log::max_level());
}

/// Initialize logging from a [`LoggingConfig`].
///
/// `level` overrides the configured level when given.
pub fn init_with_config(level: Option<LevelFilter>, config: &LoggingConfig) {
    INIT.call_once(|| {
        let level = level.unwrap_or_else(|| parse_level(&config.level));

        if !config.structured {
            install_env_logger(Some(level));
            return;
        }

        let mut logger_config = config.to_logger_config();
        logger_config.level = structured::slog_level(level);

        let guard = structured::init_global_logger(&logger_config);
        let _ = GLOBAL_GUARD.set(guard);

        let bridge_level = level.to_level().unwrap_or(log::Level::Error);
        match slog_stdlog::init_with_level(bridge_level) {
            Ok(()) => {
                USING_STRUCTURED.store(true, Ordering::SeqCst);
                info!("Structured logging initialized at level: {}", level);
            }
            Err(e) => {
                // Another logger already owns the facade; keep using it.
                log::warn!("Structured logging unavailable: {}", e);
            }
        }
    });
}

/// Whether the `slog` backend is active.
pub fn is_structured_logging() -> bool {
    USING_STRUCTURED.load(Ordering::SeqCst)
}

/// Summary line written once per proxied request.
#[derive(Debug, Clone)]
pub struct RequestOutcome<'a> {
    pub request_id: &'a str,
    pub method: &'a str,
    pub route: &'a str,
    pub status: u16,
    pub total: Duration,
    pub upstream: Option<Duration>,
}

/// Log a proxied request once it has been answered.
///
/// Structured mode emits key/value pairs; plain mode keeps everything on
/// one `[timing]` line.
pub fn log_request_outcome(outcome: &RequestOutcome<'_>) {
    let total_ms = outcome.total.as_millis() as u64;
    let upstream_ms = outcome.upstream.map_or(0, |d| d.as_millis() as u64);

    if is_structured_logging() {
        let logger = slog_scope::logger();
        slog::info!(logger, "Request completed";
            "request_id" => outcome.request_id,
            "method" => outcome.method,
            "route" => outcome.route,
            "status" => outcome.status,
            "total_ms" => total_ms,
            "upstream_ms" => upstream_ms
        );
    } else {
        info!(
            "[timing] {} {} -> {} | total={}ms upstream={}ms (request_id: {})",
            outcome.method,
            outcome.route,
            outcome.status,
            total_ms,
            upstream_ms,
            outcome.request_id
        );
    }
}
