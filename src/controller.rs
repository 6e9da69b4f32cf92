//! Session lifecycle shared by the HTTP handlers.
//!
//! A session is Open until its single submission is recorded, then Closed.
//! Problem generation and persistence are two sequential calls with no
//! atomicity: a failed generation writes nothing, and a store failure after a
//! successful generation discards the problem.

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{Evaluation, NewSubmission, Session, SessionStatus, Submission};
use crate::error::AppError;
use crate::generator::{GenerationError, Generator};
use crate::grading::grade_locally;
use crate::state::AppState;
use crate::util::trunc_for_log;

/// A session plus its derived status.
#[derive(Clone, Debug)]
pub struct SessionView {
  pub session: Session,
  pub status: SessionStatus,
}

#[instrument(level = "info", skip(state))]
pub async fn start(state: &AppState) -> Result<SessionView, AppError> {
  let problem = generator(state)?.generate_problem().await.map_err(|e| {
    error!(target: "session", error = %e, "Problem generation failed; nothing persisted");
    AppError::from(e)
  })?;

  let session = state
    .storage
    .sessions
    .create(&problem.problem_text, problem.correct_answer)
    .await
    .map_err(|e| {
      error!(target: "session", error = %e, "Session create failed; generated problem discarded");
      AppError::store("create", e)
    })?;

  info!(target: "session", id = %session.id, preview = %trunc_for_log(&session.problem_text, 40), "Session started");
  Ok(SessionView { session, status: SessionStatus::Open })
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn resume(state: &AppState, id: Uuid) -> Result<SessionView, AppError> {
  let session = state.storage.sessions.get(id).await.map_err(|e| {
    warn!(target: "session", %id, error = %e, "Session lookup failed");
    AppError::store("get", e)
  })?;
  let answered = state
    .storage
    .submissions
    .find_by_session(id)
    .await
    .map_err(|e| AppError::store("get", e))?
    .is_some();
  let status = if answered { SessionStatus::Closed } else { SessionStatus::Open };
  info!(target: "session", %id, ?status, "Session resumed");
  Ok(SessionView { session, status })
}

/// Replace the problem of an open session in place, keeping its id.
#[instrument(level = "info", skip(state), fields(%id))]
pub async fn regenerate(state: &AppState, id: Uuid) -> Result<SessionView, AppError> {
  // A stale or answered id must not cost a model call.
  let current = resume(state, id).await?;
  if current.status == SessionStatus::Closed {
    return Err(AppError::AlreadyAnswered);
  }

  let problem = generator(state)?.generate_problem().await.map_err(|e| {
    error!(target: "session", %id, error = %e, "Problem regeneration failed; session unchanged");
    AppError::from(e)
  })?;

  let session = state
    .storage
    .sessions
    .update(id, &problem.problem_text, problem.correct_answer)
    .await
    .map_err(|e| AppError::store("update", e))?;
  info!(target: "session", %id, "Session regenerated in place");
  Ok(SessionView { session, status: SessionStatus::Open })
}

#[instrument(level = "info", skip(state), fields(%id, %user_answer))]
pub async fn submit(state: &AppState, id: Uuid, user_answer: f64) -> Result<Submission, AppError> {
  if !user_answer.is_finite() {
    return Err(AppError::BadRequest("answer must be a finite number".into()));
  }
  // Checked before judging so a repeat submit does not cost a model call;
  // the unique index still settles races.
  let SessionView { session, status } = resume(state, id).await?;
  if status == SessionStatus::Closed {
    return Err(AppError::AlreadyAnswered);
  }

  let evaluation = judge(state, &session, user_answer).await;

  let submission = state
    .storage
    .submissions
    .create(NewSubmission {
      session_id: id,
      user_answer,
      is_correct: evaluation.is_correct,
      feedback_text: evaluation.feedback_text,
      judged_by: evaluation.judged_by,
    })
    .await
    .map_err(|e| {
      warn!(target: "session", %id, error = %e, "Submission create failed");
      AppError::store("submit", e)
    })?;

  info!(target: "session", %id, is_correct = submission.is_correct, judged_by = submission.judged_by.as_str(), "Submission recorded");
  Ok(submission)
}

fn generator(state: &AppState) -> Result<&dyn Generator, AppError> {
  state.generator.as_deref().ok_or_else(|| {
    error!(target: "session", "No generator configured (OPENAI_API_KEY unset)");
    AppError::Generation(GenerationError::NotConfigured)
  })
}

/// Model judgment when available; exact local comparison only if the model is
/// absent or its call fails.
async fn judge(state: &AppState, session: &Session, user_answer: f64) -> Evaluation {
  if let Some(g) = &state.generator {
    match g.evaluate(&session.problem_text, session.correct_answer, user_answer).await {
      Ok(e) => return e,
      Err(e) => {
        error!(target: "session", id = %session.id, error = %e, "Model judgment failed; using local comparison.");
      }
    }
  }
  grade_locally(session.correct_answer, user_answer)
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use async_trait::async_trait;

  use super::*;
  use crate::domain::Judge;
  use crate::generator::testing::ScriptedGenerator;
  use crate::store::{MemoryStore, SessionStore, Storage, StoreError, SubmissionStore};

  fn state_with(generator: Option<Arc<ScriptedGenerator>>, store: MemoryStore) -> AppState {
    let storage = Storage { sessions: Arc::new(store.clone()), submissions: Arc::new(store) };
    AppState::new(storage, generator.map(|g| g as Arc<dyn Generator>))
  }

  /// Session store that always fails to write.
  struct BrokenSessions;

  #[async_trait]
  impl SessionStore for BrokenSessions {
    async fn create(&self, _: &str, _: f64) -> Result<Session, StoreError> {
      Err(StoreError::Backend("database is offline".into()))
    }
    async fn update(&self, _: Uuid, _: &str, _: f64) -> Result<Session, StoreError> {
      Err(StoreError::Backend("database is offline".into()))
    }
    async fn get(&self, _: Uuid) -> Result<Session, StoreError> {
      Err(StoreError::Backend("database is offline".into()))
    }
  }

  #[tokio::test]
  async fn start_persists_generated_problem() {
    let store = MemoryStore::new();
    let gen = Arc::new(ScriptedGenerator::new().with_problem("What is 3+5?", 8.0));
    let state = state_with(Some(gen), store.clone());

    let view = start(&state).await.expect("started");
    assert_eq!(view.status, SessionStatus::Open);
    assert_eq!(view.session.problem_text, "What is 3+5?");
    assert_eq!(view.session.correct_answer, 8.0);

    let again = resume(&state, view.session.id).await.expect("retrievable");
    assert_eq!(again.session, view.session);
  }

  #[tokio::test]
  async fn generator_failure_writes_nothing() {
    let store = MemoryStore::new();
    let gen = Arc::new(ScriptedGenerator::new().with_problem_failure("network down"));
    let state = state_with(Some(gen), store.clone());

    assert!(matches!(start(&state).await, Err(AppError::Generation(_))));
    assert_eq!(store.session_count().await, 0);
  }

  #[tokio::test]
  async fn missing_generator_is_a_generation_failure() {
    let store = MemoryStore::new();
    let state = state_with(None, store.clone());
    assert!(matches!(start(&state).await, Err(AppError::Generation(_))));
    assert_eq!(store.session_count().await, 0);
  }

  #[tokio::test]
  async fn store_failure_discards_problem_without_retry() {
    let gen = Arc::new(ScriptedGenerator::new().with_problem("What is 3+5?", 8.0).with_problem("spare", 1.0));
    let storage = Storage { sessions: Arc::new(BrokenSessions), submissions: Arc::new(MemoryStore::new()) };
    let state = AppState::new(storage, Some(gen.clone() as Arc<dyn Generator>));

    let err = start(&state).await.unwrap_err();
    assert!(matches!(err, AppError::Persistence { op: "create", .. }));
    assert_eq!(gen.problem_calls(), 1);
  }

  #[tokio::test]
  async fn resume_unknown_is_uniform_failure() {
    let state = state_with(None, MemoryStore::new());
    let err = resume(&state, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AppError::Persistence { op: "get", source: StoreError::NotFound }));
  }

  #[tokio::test]
  async fn local_fallback_grades_exactly() {
    let store = MemoryStore::new();
    let state = state_with(None, store.clone());
    let right = SessionStore::create(&store, "What is 3+5?", 8.0).await.unwrap();
    let wrong = SessionStore::create(&store, "What is 3+5?", 8.0).await.unwrap();

    let ok = submit(&state, right.id, 8.0).await.unwrap();
    assert!(ok.is_correct);
    assert_eq!(ok.judged_by, Judge::Local);

    let bad = submit(&state, wrong.id, 8.000001).await.unwrap();
    assert!(!bad.is_correct);
  }

  #[tokio::test]
  async fn model_verdict_is_authoritative() {
    let store = MemoryStore::new();
    let gen = Arc::new(ScriptedGenerator::new().with_verdict(true, "Close enough: 7.99 rounds to 8."));
    let state = state_with(Some(gen), store.clone());
    let s = SessionStore::create(&store, "About how much is 3.99+4?", 8.0).await.unwrap();

    let sub = submit(&state, s.id, 7.99).await.unwrap();
    assert!(sub.is_correct);
    assert_eq!(sub.judged_by, Judge::Model);
    assert_eq!(sub.feedback_text, "Close enough: 7.99 rounds to 8.");
  }

  #[tokio::test]
  async fn model_failure_falls_back_to_local() {
    let store = MemoryStore::new();
    let gen = Arc::new(ScriptedGenerator::new().with_verdict_failure("quota"));
    let state = state_with(Some(gen), store.clone());
    let s = SessionStore::create(&store, "What is 3+5?", 8.0).await.unwrap();

    let sub = submit(&state, s.id, 9.0).await.unwrap();
    assert!(!sub.is_correct);
    assert_eq!(sub.judged_by, Judge::Local);
  }

  #[tokio::test]
  async fn second_submission_is_rejected_and_session_closes() {
    let store = MemoryStore::new();
    let gen = Arc::new(ScriptedGenerator::new().with_verdict(true, "Well done!").with_verdict(false, "spare"));
    let state = state_with(Some(gen.clone()), store.clone());
    let s = SessionStore::create(&store, "2+2?", 4.0).await.unwrap();

    submit(&state, s.id, 4.0).await.unwrap();
    assert!(matches!(submit(&state, s.id, 5.0).await, Err(AppError::AlreadyAnswered)));
    assert_eq!(gen.evaluate_calls(), 1);
    assert_eq!(resume(&state, s.id).await.unwrap().status, SessionStatus::Closed);
    let stored = store.find_by_session(s.id).await.unwrap().unwrap();
    assert_eq!(stored.user_answer, 4.0);
  }

  #[tokio::test]
  async fn regenerate_replaces_open_session_only() {
    let store = MemoryStore::new();
    let gen = Arc::new(
      ScriptedGenerator::new()
        .with_problem("What is 3+5?", 8.0)
        .with_problem("What is 6*7?", 42.0)
        .with_problem("unused", 0.0),
    );
    let state = state_with(Some(gen.clone()), store.clone());

    let first = start(&state).await.unwrap();
    let second = regenerate(&state, first.session.id).await.unwrap();
    assert_eq!(second.session.id, first.session.id);
    assert_eq!(second.session.correct_answer, 42.0);
    assert_eq!(store.session_count().await, 1);

    submit(&state, first.session.id, 42.0).await.unwrap();
    assert!(matches!(regenerate(&state, first.session.id).await, Err(AppError::AlreadyAnswered)));
    assert_eq!(gen.problem_calls(), 2);
  }

  #[tokio::test]
  async fn submit_unknown_session_fails_without_fault() {
    let state = state_with(None, MemoryStore::new());
    assert!(matches!(
      submit(&state, Uuid::new_v4(), 1.0).await,
      Err(AppError::Persistence { op: "get", .. })
    ));
  }

  #[tokio::test]
  async fn end_to_end_three_plus_five() {
    let store = MemoryStore::new();
    let gen = Arc::new(
      ScriptedGenerator::new()
        .with_problem("What is 3+5?", 8.0)
        .with_verdict(true, "Correct! 3 + 5 = 8."),
    );
    let state = state_with(Some(gen), store.clone());

    let view = start(&state).await.unwrap();
    let sub = submit(&state, view.session.id, 8.0).await.unwrap();
    assert!(sub.is_correct);
    assert_eq!(sub.session_id, view.session.id);
  }
}
