//! Domain models: math problem sessions, submissions, and generator outputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One generated problem paired with its correct answer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Session {
  pub id: Uuid,
  pub problem_text: String,
  pub correct_answer: f64,
  pub created_at: DateTime<Utc>,
}

/// Derived from whether a submission exists; never stored on the session row.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
  Open,
  Closed,
}

/// Which grader decided `is_correct` for a submission.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Judge {
  /// The external text model judged the answer.
  Model,
  /// Exact numeric comparison against the stored answer.
  Local,
}

impl Judge {
  pub fn as_str(self) -> &'static str {
    match self {
      Judge::Model => "model",
      Judge::Local => "local",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "model" => Some(Judge::Model),
      "local" => Some(Judge::Local),
      _ => None,
    }
  }
}

/// A single recorded answer attempt against a session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Submission {
  pub id: Uuid,
  pub session_id: Uuid,
  pub user_answer: f64,
  pub is_correct: bool,
  pub feedback_text: String,
  pub judged_by: Judge,
  pub created_at: DateTime<Utc>,
}

/// Input to `SubmissionStore::create`.
#[derive(Clone, Debug)]
pub struct NewSubmission {
  pub session_id: Uuid,
  pub user_answer: f64,
  pub is_correct: bool,
  pub feedback_text: String,
  pub judged_by: Judge,
}

/// Problem as returned by the generator, before persistence.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct GeneratedProblem {
  pub problem_text: String,
  pub correct_answer: f64,
}

/// Grading outcome, from the model or the local comparison.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
  pub is_correct: bool,
  pub feedback_text: String,
  pub judged_by: Judge,
}
