//! The text-generation seam: problem generation and answer judgment.
//!
//! `OpenAI` (see `openai.rs`) is the production implementation. Every failure,
//! including a reply that does not fit the requested shape, surfaces as a
//! `GenerationError`; callers never see a parse panic.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Evaluation, GeneratedProblem};
use crate::shape::ShapeError;

#[derive(Debug, Error)]
pub enum GenerationError {
  #[error("request failed: {0}")]
  Transport(String),
  #[error("model HTTP {status}: {message}")]
  Status { status: u16, message: String },
  #[error("model reply rejected: {0}")]
  Shape(#[from] ShapeError),
  #[error("model reply unusable: {0}")]
  Invalid(String),
  #[error("no generator configured")]
  NotConfigured,
}

#[async_trait]
pub trait Generator: Send + Sync {
  /// Produce one problem for the configured grade level. Single attempt.
  async fn generate_problem(&self) -> Result<GeneratedProblem, GenerationError>;

  /// Judge `user_answer` for `problem_text` and write feedback.
  async fn evaluate(
    &self,
    problem_text: &str,
    correct_answer: f64,
    user_answer: f64,
  ) -> Result<Evaluation, GenerationError>;
}

#[cfg(test)]
pub mod testing {
  //! Scripted generator for controller and router tests.

  use std::collections::VecDeque;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  use super::*;
  use crate::domain::Judge;

  #[derive(Default)]
  pub struct ScriptedGenerator {
    problems: Mutex<VecDeque<Result<GeneratedProblem, String>>>,
    verdicts: Mutex<VecDeque<Result<(bool, String), String>>>,
    pub problem_calls: AtomicUsize,
    pub evaluate_calls: AtomicUsize,
  }

  impl ScriptedGenerator {
    pub fn new() -> Self {
      Self::default()
    }

    pub fn with_problem(self, text: &str, answer: f64) -> Self {
      self.push_problem(Ok(GeneratedProblem { problem_text: text.into(), correct_answer: answer }));
      self
    }

    pub fn with_problem_failure(self, message: &str) -> Self {
      self.push_problem(Err(message.into()));
      self
    }

    pub fn with_verdict(self, is_correct: bool, feedback: &str) -> Self {
      if let Ok(mut q) = self.verdicts.lock() {
        q.push_back(Ok((is_correct, feedback.into())));
      }
      self
    }

    pub fn with_verdict_failure(self, message: &str) -> Self {
      if let Ok(mut q) = self.verdicts.lock() {
        q.push_back(Err(message.into()));
      }
      self
    }

    fn push_problem(&self, item: Result<GeneratedProblem, String>) {
      if let Ok(mut q) = self.problems.lock() {
        q.push_back(item);
      }
    }

    pub fn problem_calls(&self) -> usize {
      self.problem_calls.load(Ordering::SeqCst)
    }

    pub fn evaluate_calls(&self) -> usize {
      self.evaluate_calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl Generator for ScriptedGenerator {
    async fn generate_problem(&self) -> Result<GeneratedProblem, GenerationError> {
      self.problem_calls.fetch_add(1, Ordering::SeqCst);
      let next = self.problems.lock().ok().and_then(|mut q| q.pop_front());
      match next {
        Some(Ok(p)) => Ok(p),
        Some(Err(m)) => Err(GenerationError::Transport(m)),
        None => Err(GenerationError::Transport("script exhausted".into())),
      }
    }

    async fn evaluate(&self, _problem_text: &str, _correct_answer: f64, _user_answer: f64) -> Result<Evaluation, GenerationError> {
      self.evaluate_calls.fetch_add(1, Ordering::SeqCst);
      let next = self.verdicts.lock().ok().and_then(|mut q| q.pop_front());
      match next {
        Some(Ok((is_correct, feedback_text))) => Ok(Evaluation { is_correct, feedback_text, judged_by: Judge::Model }),
        Some(Err(m)) => Err(GenerationError::Transport(m)),
        None => Err(GenerationError::Transport("script exhausted".into())),
      }
    }
  }
}
