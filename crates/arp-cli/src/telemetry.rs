//! Logging setup

use tracing_subscriber::EnvFilter;

/// Install the global subscriber on stderr
///
/// `RUST_LOG` wins; otherwise `info`, or `debug` with `verbose`. Stdout is
/// left for command output.
pub fn init(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    // a subscriber may already be installed when embedded
    let _ = if json {
        builder.json().flatten_event(true).try_init()
    } else {
        builder.compact().try_init()
    };
}
