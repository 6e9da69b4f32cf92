//! Application state shared by every handler.
//!
//! This module owns:
//!   - the session/submission stores (SQLite or in-memory)
//!   - the optional text generator (OpenAI when OPENAI_API_KEY is set)
//!
//! Handlers hold no other mutable state; everything persistent lives in the store.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::generator::Generator;
use crate::openai::OpenAI;
use crate::store::{Storage, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub generator: Option<Arc<dyn Generator>>,
}

impl AppState {
    pub fn new(storage: Storage, generator: Option<Arc<dyn Generator>>) -> Self {
        Self { storage, generator }
    }

    /// Build state from config: connect + migrate the store, init OpenAI.
    #[instrument(level = "info", skip_all)]
    pub async fn from_config(cfg: &AppConfig) -> Result<Self, StoreError> {
        let storage = Storage::from_url(&cfg.database_url).await?;
        if cfg.database_url == "memory" {
            warn!(target: "math_tutor", "Using in-memory store; sessions are lost on restart.");
        } else {
            info!(target: "math_tutor", "SQLite store ready.");
        }

        let openai = OpenAI::from_env(cfg.tutor.clone());
        let generator: Option<Arc<dyn Generator>> = match openai {
            Some(oa) => {
                info!(target: "math_tutor", base_url = %oa.base_url, model = %oa.model, grade_level = %oa.tutor.grade_level, "OpenAI enabled.");
                Some(Arc::new(oa))
            }
            None => {
                warn!(target: "math_tutor", "OpenAI disabled (no OPENAI_API_KEY). Problems cannot be generated; answers are graded locally.");
                None
            }
        };

        Ok(Self::new(storage, generator))
    }
}
