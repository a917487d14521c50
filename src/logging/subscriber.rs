//! Tracing subscriber setup: console formatter and initialisation.
use tracing_subscriber::EnvFilter;

/// Extracts the `message` field from a [`tracing::Event`].
#[derive(Default)]
struct MessageExtractor {
    message: String,
}

impl tracing::field::Visit for MessageExtractor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

/// A [`tracing_subscriber::fmt::FormatEvent`] for engine output: warnings
/// keep their multi-line blocks intact, parse trace events are indented under
/// a `trace` marker.
struct EngineFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for EngineFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let level = *metadata.level();
        let target = metadata.target();
        let ansi = writer.has_ansi_escapes();

        let mut extractor = MessageExtractor::default();
        event.record(&mut extractor);
        let msg = &extractor.message;

        let (color, label) = match level {
            tracing::Level::ERROR => ("\x1b[31m", "ERROR"),
            tracing::Level::WARN => ("\x1b[33m", "WARN "),
            tracing::Level::INFO => ("\x1b[32m", "INFO "),
            tracing::Level::DEBUG => ("\x1b[2m", "DEBUG"),
            tracing::Level::TRACE if target == "configparser_enhanced::trace" => {
                ("\x1b[2m", "trace")
            }
            tracing::Level::TRACE => ("\x1b[2m", "TRACE"),
        };
        if ansi {
            writeln!(writer, "{color}{label}\x1b[0m {msg}")
        } else {
            writeln!(writer, "{label} {msg}")
        }
    }
}

/// Map an engine debug level to a default filter directive.
const fn level_directive(debug_level: u8) -> &'static str {
    match debug_level {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Tracing level of an engine message gated at `debug_level`, chosen so the
/// filter installed by [`init_subscriber`] for that level lets it through.
pub(crate) const fn event_level(debug_level: u8) -> tracing::Level {
    match debug_level {
        0 | 1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

/// Initialise the global [`tracing`] subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence; otherwise the filter follows `debug_level`
/// (0 = warnings only, 1 = info, 2 = debug, 3+ = trace). Returns `false` if a
/// global subscriber was already installed.
pub fn init_subscriber(debug_level: u8) -> bool {
    use tracing_subscriber::{fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(debug_level)));

    let console_layer = fmt::layer()
        .event_format(EngineFormatter)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init()
        .is_ok()
}
