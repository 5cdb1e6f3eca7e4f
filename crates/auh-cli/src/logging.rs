use tracing_subscriber::EnvFilter;

const LOG_ENV_VAR: &str = "AUH_LOG";

/// Initializes the subscriber. An explicit filter wins over the
/// environment; the fallback level is `info`.
pub fn init(filter: Option<&str>) {
    let filter = match filter {
        Some(filter) => EnvFilter::new(filter),
        None => EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
