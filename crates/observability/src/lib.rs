//! Process-wide logging setup shared by the binaries.

pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize structured logging from the environment.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init() {
    crate::tracing::init(LogFormat::from_env());
}
