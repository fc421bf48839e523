//! Log output setup.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogSection;

/// Install the global subscriber. `RUST_LOG` wins over the configured filter.
/// A second call is a no-op.
pub fn init_tracing(log: &LogSection) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let builder = fmt().with_env_filter(filter);
    let res = if log.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = res {
        eprintln!("tracing init skipped: {e}");
    }
}
