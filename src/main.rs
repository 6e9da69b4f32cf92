//! Math Tutor · primary-school problem generator backend
//!
//! - Axum HTTP API (`/api/math-problem`, `/api/math-problem/submit`)
//! - OpenAI problem generation + answer judgment (via environment variables)
//! - SQLite persistence through sqlx (or in-memory with DATABASE_URL=memory)
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   STATIC_DIR        : SPA directory (default "./static")
//!   DATABASE_URL      : default "sqlite://math_tutor.db?mode=rwc", or "memory"
//!   OPENAI_API_KEY    : enables problem generation and model grading
//!   OPENAI_BASE_URL   : default "https://api.openai.com/v1"
//!   OPENAI_MODEL      : default "gpt-4o-mini"
//!   TUTOR_CONFIG_PATH : path to TOML config (grade level, temperature, prompts)
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod shape;
mod generator;
mod openai;
mod grading;
mod store;
mod error;
mod state;
mod controller;
mod protocol;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let cfg = AppConfig::from_env();

  // Shared application state (store handles + optional OpenAI client).
  let state = match AppState::from_config(&cfg).await {
    Ok(s) => Arc::new(s),
    Err(e) => {
      error!(target: "math_tutor", error = %e, "Failed to open the session store");
      return Err(e.into());
    }
  };

  let app = build_router(state, &cfg.static_dir);

  let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "math_tutor", %addr, static_dir = %cfg.static_dir, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "math_tutor", "Shutdown signal received");
    })
    .await?;
  Ok(())
}
