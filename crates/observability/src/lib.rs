//! Process-wide logging setup shared by the relay binaries and tests.

pub mod tracing;

pub use crate::tracing::LogSettings;

/// Initialize logging with `settings`.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init(settings: &LogSettings) {
    crate::tracing::init(settings);
}

/// Initialize logging with defaults (`RUST_LOG` or `info`, JSON lines).
pub fn init_default() {
    crate::tracing::init(&LogSettings::default());
}
