use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging to stdout.
///
/// Debug mode gets human-readable colored output; otherwise events are
/// flattened JSON for log aggregators. `RUST_LOG` takes precedence over
/// the debug flag. Must be called exactly once at startup.
pub fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if debug {
        registry
            .with(fmt::layer().pretty().with_target(true).with_ansi(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_ansi(false),
            )
            .init();
    }
}
