//! Log subscriber setup.
//!
//! `LOG_LEVEL` takes an `EnvFilter` directive string; without it the default
//! below applies (session events at debug, sqlx quiet). `LOG_FORMAT=json`
//! emits one JSON object per event, anything else the human-readable format.
//! Request spans come from the router's `TraceLayer`.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,session=debug,math_tutor=debug,tower_http=info,axum=info,sqlx=warn";

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // `.json()` changes the builder type, so each arm calls `init` itself.
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}
