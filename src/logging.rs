/// Install a stderr `tracing` subscriber honoring `RUST_LOG`.
///
/// Convenience for binaries and tests embedding the engine; a library
/// user with their own subscriber simply skips this. Best-effort: an
/// already-installed global subscriber is left in place.
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("websource=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
