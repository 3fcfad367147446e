//! Tracing setup.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.
//! `RUST_LOG` takes precedence over the configured level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Build the filter: `RUST_LOG` if set, otherwise `draftgate=<level>` (or
/// `draftgate=debug` when verbose) with `warn` for everything else.
pub fn build_filter(level: &str, verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| {
            let level = if verbose { "debug" } else { level };
            EnvFilter::try_new(format!("draftgate={},warn", level))
        })
        .unwrap_or_else(|_| EnvFilter::new("draftgate=info,warn"))
}

/// Install the global subscriber. Calling it twice is an error.
pub fn init_tracing(level: &str, verbose: bool, json: bool) -> anyhow::Result<()> {
    let filter = build_filter(level, verbose);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_target(verbose),
            )
            .try_init()?;
    }

    Ok(())
}
