//! Logging setup utilities for the Hiroma chat client.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the specified default log level.
///
/// The filter covers the `hiroma_client` library crate and the binary itself.
/// The log level can be overridden using the `RUST_LOG` environment variable,
/// e.g. `RUST_LOG=hiroma_client=trace` to see every STOMP frame.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "hiroma-client")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn", "error")
///
/// # Examples
///
/// ```no_run
/// use hiroma_shared::logger::setup_logger;
///
/// setup_logger("hiroma-client", "info");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(binary_name, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the filter directive used when `RUST_LOG` is not set.
fn default_filter(binary_name: &str, default_log_level: &str) -> String {
    let mut targets = vec!["hiroma_client".to_string(), "hiroma_shared".to_string()];
    let binary_target = binary_name.replace('-', "_");
    if !targets.contains(&binary_target) {
        targets.push(binary_target);
    }
    targets
        .iter()
        .map(|target| format!("{}={}", target, default_log_level))
        .collect::<Vec<_>>()
        .join(",")
}
