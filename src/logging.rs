//! Logging prelude module for convenient access to tracing macros.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("Synced {} records", count);
//! warn!("Remote write failed: {}", e);
//! ```

pub use tracing::{debug, error, info, warn};

use crate::config::LogFormat;

/// Initialize the tracing subscriber.
///
/// `level` is the default filter; the `RUST_LOG` environment variable takes
/// precedence when set:
///
/// ```bash
/// RUST_LOG=debug vaultsync sync
/// RUST_LOG=vaultsync::sync=debug vaultsync sync
/// ```
///
/// Output goes to stderr so command output on stdout stays clean.
pub fn init_tracing(level: &str, format: LogFormat) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
	let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);

	let result = match format {
		LogFormat::Full => builder.try_init(),
		LogFormat::Compact => builder.compact().try_init(),
	};
	if let Err(e) = result {
		// Already installed (tests, embedding callers)
		debug!("Tracing subscriber not installed: {}", e);
	}
}

// vim: ts=4
