use tracing_subscriber::EnvFilter;

/// Installs the global subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence; otherwise `info`, or `debug` when verbose.
pub fn init(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .try_init()
}
