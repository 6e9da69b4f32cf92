//! The flat, user-facing failure taxonomy.
//!
//! Every variant renders as a short human message for the `{success: 0}`
//! envelope. Internal detail stays in the logs.

use thiserror::Error;

use crate::generator::GenerationError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("generation failed: {0}")]
  Generation(#[from] GenerationError),

  #[error("persistence failed ({op}): {source}")]
  Persistence { op: &'static str, source: StoreError },

  #[error("session already answered")]
  AlreadyAnswered,

  #[error("bad request: {0}")]
  BadRequest(String),
}

impl AppError {
  /// Wrap a store failure; a conflict always means the single-use rule fired.
  pub fn store(op: &'static str, source: StoreError) -> Self {
    match source {
      StoreError::Conflict => AppError::AlreadyAnswered,
      source => AppError::Persistence { op, source },
    }
  }

  pub fn user_message(&self) -> String {
    match self {
      AppError::Generation(_) => "Error generating math problem. Please try again.".into(),
      AppError::Persistence { op: "get", source: StoreError::NotFound } => {
        "Math problem session not found. Please generate a new problem.".into()
      }
      AppError::Persistence { op, .. } => match *op {
        "get" => "Error getting math problem session. Please try again.".into(),
        "submit" => "Error submitting answer. Please try again later.".into(),
        _ => "Error saving math problem session. Please try again.".into(),
      },
      AppError::AlreadyAnswered => "This problem has already been answered. Please generate a new problem.".into(),
      AppError::BadRequest(detail) => format!("Invalid request: {detail}"),
    }
  }
}
