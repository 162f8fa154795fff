//! Logging initialization module

use std::sync::Once;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

/// Logging profile configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable output for development
    Development,
    /// JSON structured output for production
    Production,
    /// Test capture mode for deterministic testing
    Test,
}

static INIT_ONCE: Once = Once::new();

/// Initialize the logging facility
///
/// Hosts embedding revtrail usually install their own subscriber; this is
/// for binaries and tests that do not. Calling it more than once is a no-op.
///
/// - **Development**: human-readable, `revtrail=debug`
/// - **Production**: JSON lines, `revtrail=info`
/// - **Test**: bare registry; use `init_test_capture()` to record events
///
/// Output goes to stderr so stdout stays free for command results.
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| {
        let result = match profile {
            Profile::Development => tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("revtrail=debug")),
                )
                .with_writer(std::io::stderr)
                .finish()
                .try_init(),
            Profile::Production => tracing_subscriber::fmt()
                .json()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("revtrail=info")),
                )
                .with_writer(std::io::stderr)
                .finish()
                .try_init(),
            Profile::Test => tracing_subscriber::registry().try_init(),
        };
        // A host subscriber may already be installed; keep it.
        let _ = result;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_idempotent() {
        init(Profile::Test);
        init(Profile::Test);
        init(Profile::Production);
    }
}
