//! Tracing/logging bootstrap for the console app.

use std::env;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn,chatlink_console=info,chatlink_runtime=info";

/// Initialize global tracing subscriber with severity gating from environment.
///
/// Precedence:
/// 1) `RUST_LOG`
/// 2) `CHATLINK_CONSOLE_LOG`
/// 3) `CHATLINK_LOG`
/// 4) internal default filter
///
/// Logs go to stderr so they never interleave with the conversation on stdout.
pub fn init() {
    let env_filter = filter_from_env();
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .try_init();
}

fn filter_from_env() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    for key in ["CHATLINK_CONSOLE_LOG", "CHATLINK_LOG"] {
        if let Some(value) = env::var(key).ok().filter(|v| !v.trim().is_empty())
            && let Ok(filter) = EnvFilter::try_new(value)
        {
            return filter;
        }
    }

    EnvFilter::new(DEFAULT_FILTER)
}
