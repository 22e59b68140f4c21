//! Structured logging initialization.

use crate::error::TelemetryResult;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging.
///
/// Console output is JSON in production (`RUST_ENV=production`) and
/// pretty otherwise. When `log_dir` is given, a plain-text copy also
/// goes to a daily-rotated file in that directory; the returned guard
/// must be held for the lifetime of the process or buffered lines are
/// lost on exit.
pub fn init_logging(log_dir: Option<&str>) -> TelemetryResult<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,vimon=debug"));

    let is_production = std::env::var("RUST_ENV")
        .map(|v| v == "production")
        .unwrap_or(false);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "vimon.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let base = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    if is_production {
        base.with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true),
        )
        .init();
    } else {
        base.with(
            fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_names(true),
        )
        .init();
    }

    Ok(guard)
}
