//! Structured logging setup (spec §8, "Logging").
//!
//! Mirrors the teacher's use of `tracing` for structured, leveled logs
//! instead of `println!`/`eprintln!`, with verbosity controlled by
//! `RUST_LOG` through `tracing-subscriber`'s env filter.

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber reading its filter from
/// `RUST_LOG`, defaulting to `info` when unset. Safe to call once at
/// process startup; calling it twice returns an error from the underlying
/// subscriber crate, which is swallowed here since a second call generally
/// means a test harness already installed one.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
