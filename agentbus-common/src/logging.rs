//! Structured logging setup shared by every crate in the workspace.
//!
//! Mirrors the reference crate's logging module: an env-driven level filter,
//! a compact formatter, and a custom timer so log lines carry an integer
//! microsecond timestamp instead of a verbose RFC 3339 string. A small family
//! of `macro_rules!` wrappers keep every crate's `tracing` events under the
//! same `agentbus` target prefix so multi-crate output stays attributable to
//! one logical system.

use chrono::Utc;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    filter::FilterFn, fmt::time::FormatTime, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt, Layer,
};

struct Time;

impl FormatTime for Time {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let time = Utc::now();
        w.write_fmt(format_args!("{:?}", time.timestamp_micros()))
    }
}

/// Emit a `tracing` event under a named span, scoped to the `agentbus` target.
#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!(target: "agentbus", $level, $span);
        let _enter = span.enter();

        $crate::tracing::event!(target: "agentbus", $level, $($msg),*)
    }};
}

/// Events on the send/enqueue side of the message hub.
#[macro_export]
macro_rules! outbound {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outbound", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outbound!(level = TRACE, $($msg),*)
    };
}

/// Events on the receive/delivery side of the message hub.
#[macro_export]
macro_rules! inbound {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "inbound", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::inbound!(level = TRACE, $($msg),*)
    };
}

/// Events internal to a store or coordinator (background loops, recovery, bookkeeping).
#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

/// Install the global `tracing` subscriber.
///
/// The level defaults to `TRACE` in debug builds and `INFO` in release builds,
/// overridable with the `LOG_LEVEL` environment variable (`warn`, `info`,
/// `trace`; anything else maps to `error`). Only events whose target starts
/// with `agentbus` are emitted, so a host application embedding this crate
/// family doesn't get its own logs filtered by our choice of level.
pub fn init() {
    let level = if let Ok(level) = std::env::var("LOG_LEVEL") {
        match level.to_ascii_lowercase().as_str() {
            "warn" => LevelFilter::WARN,
            "info" => LevelFilter::INFO,
            "trace" => LevelFilter::TRACE,
            _ => LevelFilter::ERROR,
        }
    } else if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    tracing_subscriber::Registry::default()
        .with(
            (if cfg!(debug_assertions) {
                tracing_subscriber::fmt::layer()
            } else {
                tracing_subscriber::fmt::layer()
                    .with_file(false)
                    .with_line_number(false)
            })
            .compact()
            .with_ansi(true)
            .with_timer(Time)
            .with_target(false)
            .with_level(false)
            .with_filter(level)
            .with_filter(FilterFn::new(|metadata| {
                metadata.target().starts_with("agentbus")
            })),
        )
        .try_init()
        .ok();
}
