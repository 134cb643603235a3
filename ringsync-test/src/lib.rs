pub mod mock;

/// Initialize tracing for tests. Safe to call from every test; only
/// the first call wins. Control verbosity with `RUST_LOG`.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
