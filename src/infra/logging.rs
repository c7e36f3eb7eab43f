//! Diagnostic logging setup.

use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with environment-based filtering.
///
/// - `quiet`: Suppress all diagnostic output
/// - `verbose`: Enable debug-level logging
///
/// Otherwise `RUST_LOG` decides, defaulting to `warn`. Diagnostics go to
/// stderr so they never interleave with the report on stdout.
pub fn init_tracing(quiet: bool, verbose: bool) {
    let filter = if quiet {
        EnvFilter::new("off")
    } else if verbose {
        EnvFilter::new("matrix_ci=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // A second initialization (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
