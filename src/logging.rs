//! Tracing subscriber bootstrap for embedding applications and tests.

use tracing_subscriber::EnvFilter;

fn filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install a stderr fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter`. Only the first call installs anything.
pub fn init(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(default_filter))
        .with_writer(std::io::stderr)
        .try_init();
}

/// Like [`init`], but output goes through the libtest capture.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("flowsink=trace"))
        .with_test_writer()
        .try_init();
}
