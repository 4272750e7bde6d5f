use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // ignore the error if a subscriber is already installed
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
