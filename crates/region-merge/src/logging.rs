/*!
Logging and profiling integration for the region-merge CLI.

There are two implementations behind one API:

- real: compiled only when `feature = "profiling"` is set. Adds a tracing-chrome
  layer when `ENABLE_PROFILING` is present in the environment; the returned guard
  flushes the `trace-*.json` file when dropped.
- stub: compiled in all other configurations. Logging only.

Top-level API (always available):
- `setup_logging() -> LoggingGuard`
*/

/// Default filter used when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "info";

fn set_default_filter() {
    if std::env::var("RUST_LOG").is_err() {
        // Safety: single-threaded at startup
        unsafe {
            std::env::set_var("RUST_LOG", DEFAULT_FILTER);
        }
    }
}

#[cfg(feature = "profiling")]
mod inner {
    use tracing_chrome::{ChromeLayerBuilder, FlushGuard};
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::registry::LookupSpan;
    use tracing_subscriber::{EnvFilter, Layer, fmt};

    /// Keeps the trace file open until the program exits
    pub struct LoggingGuard {
        _chrome: Option<FlushGuard>,
    }

    fn fmt_layer<S>() -> impl Layer<S>
    where
        S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(EnvFilter::from_default_env())
    }

    pub fn setup_logging() -> LoggingGuard {
        super::set_default_filter();

        if std::env::var("ENABLE_PROFILING").is_ok() {
            let (chrome_layer, guard) = ChromeLayerBuilder::new().build();
            tracing_subscriber::registry()
                .with(chrome_layer)
                .with(fmt_layer())
                .init();
            tracing::info!("ENABLE_PROFILING set - writing trace-*.json in the current directory");
            LoggingGuard {
                _chrome: Some(guard),
            }
        } else {
            tracing_subscriber::registry().with(fmt_layer()).init();
            tracing::debug!("Logging initialized (set ENABLE_PROFILING to record a trace)");
            LoggingGuard { _chrome: None }
        }
    }
}

#[cfg(not(feature = "profiling"))]
mod inner {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    /// Nothing to flush without the profiling feature
    pub struct LoggingGuard;

    pub fn setup_logging() -> LoggingGuard {
        super::set_default_filter();

        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(EnvFilter::from_default_env());
        tracing_subscriber::registry().with(fmt_layer).init();

        tracing::debug!("Logging initialized (profiling disabled in this build)");
        LoggingGuard
    }
}

pub use inner::{LoggingGuard, setup_logging};
