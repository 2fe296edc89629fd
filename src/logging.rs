//! Diagnostic logging setup.
//!
//! Diagnostics go to stderr through `tracing`. Conversation output never does;
//! it goes through [`crate::console::Console`] so prompt redraw rules apply.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "AGENTCORE_DEV_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";
const VERBOSE_DIRECTIVE: &str = "debug";

static TRACING_INIT: Once = Once::new();

/// Filter directive: `AGENTCORE_DEV_LOG`, then `RUST_LOG`, then the default.
pub fn filter_directive(
    verbose: bool,
    lookup: impl Fn(&str) -> Option<String>,
) -> String {
    [LOG_ENV, EnvFilter::DEFAULT_ENV]
        .into_iter()
        .find_map(|key| lookup(key).filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| {
            if verbose {
                VERBOSE_DIRECTIVE.to_owned()
            } else {
                DEFAULT_DIRECTIVE.to_owned()
            }
        })
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging(verbose: bool) {
    TRACING_INIT.call_once(|| {
        let directive = filter_directive(verbose, |key| std::env::var(key).ok());
        let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
        let _ = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(verbose)
            .with_env_filter(filter)
            .try_init();
    });
}
