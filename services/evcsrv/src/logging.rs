//! Console logging for the CLI and the HTTP listener
//!
//! Lines look like `2026-01-05T10:21:07.123456Z [INFO] Listening on 0.0.0.0:5000`
//! and always go to stderr so rendered output on stdout stays clean.

use std::fmt;

use tracing::Level;
use tracing_subscriber::{
    fmt::{format::Writer, time::FormatTime, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Logging options taken from the command line
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}

/// UTC wall clock with microseconds
struct UtcMicros;

impl FormatTime for UtcMicros {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ"))
    }
}

/// Bracketed level, optionally wrapped in its terminal colour
struct LevelTag {
    level: Level,
    ansi: bool,
}

impl fmt::Display for LevelTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (tag, color) = match self.level {
            Level::TRACE => ("TRACE", "\x1b[35m"),
            Level::DEBUG => ("DEBUG", "\x1b[34m"),
            Level::INFO => ("INFO", "\x1b[32m"),
            Level::WARN => ("WARN", "\x1b[33m"),
            Level::ERROR => ("ERROR", "\x1b[31m"),
        };
        if self.ansi {
            write!(f, "{}[{}]\x1b[0m", color, tag)
        } else {
            write!(f, "[{}]", tag)
        }
    }
}

/// `timestamp [LEVEL] message`
///
/// Debug and trace lines also name their target, which is where the
/// per-request transport chatter comes from.
struct ConsoleFormat<T> {
    timer: T,
}

impl<S, N, T> FormatEvent<S, N> for ConsoleFormat<T>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    T: FormatTime,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let tag = LevelTag {
            level: *meta.level(),
            ansi: writer.has_ansi_escapes(),
        };

        self.timer.format_time(&mut writer)?;
        write!(writer, " {} ", tag)?;
        if *meta.level() >= Level::DEBUG {
            write!(writer, "{}: ", meta.target())?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Filter from `RUST_LOG`, falling back to the configured level
pub fn build_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber; later calls are ignored
pub fn init_logging(config: &LogConfig) {
    let layer = tracing_subscriber::fmt::layer()
        .event_format(ConsoleFormat { timer: UtcMicros })
        .with_ansi(config.ansi)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(build_filter(config))
        .with(layer)
        .try_init();
}
