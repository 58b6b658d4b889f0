use tracing_subscriber::EnvFilter;

/// Installs a `tracing_subscriber::fmt` subscriber with `RUST_LOG`
/// filtering, defaulting to `info` when the variable is unset.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
