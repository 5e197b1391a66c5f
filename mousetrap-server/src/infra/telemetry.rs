use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Quieter defaults with per-scan summaries. Override via `RUST_LOG`.
pub const DEFAULT_FILTER: &str =
    "info,mousetrap::scan=info,mousetrap::queue=info,tower_http=warn";

/// Install the global subscriber. `MOUSETRAP_LOG_FORMAT=json` switches to
/// JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var("MOUSETRAP_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
