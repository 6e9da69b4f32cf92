//! HTTP endpoint handlers. These are thin wrappers that forward to the session controller.
//! Every outcome, including a malformed request, is answered with the `{success, message}` envelope.

use std::sync::Arc;
use axum::{extract::{rejection::{JsonRejection, QueryRejection}, Query, State}, response::IntoResponse, Json};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::controller;
use crate::error::AppError;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

/// `GET /api/math-problem` starts a session; `?id=` resumes one.
#[instrument(level = "info", skip(state, q))]
pub async fn http_get_problem(
  State(state): State<Arc<AppState>>,
  q: Result<Query<SessionQuery>, QueryRejection>,
) -> impl IntoResponse {
  let res = match read_query(q) {
    Ok(q) => match q.id.as_deref() {
      None | Some("") => controller::start(&state).await,
      Some(raw) => match parse_id(raw) {
        Ok(id) => controller::resume(&state, id).await,
        Err(e) => Err(e),
      },
    },
    Err(e) => Err(e),
  };
  if let Ok(view) = &res {
    info!(target: "session", id = %view.session.id, status = ?view.status, "HTTP problem served");
  }
  respond(res.map(SessionOut::from))
}

/// `PUT /api/math-problem?id=` swaps in a new problem for an open session.
#[instrument(level = "info", skip(state, q))]
pub async fn http_put_problem(
  State(state): State<Arc<AppState>>,
  q: Result<Query<SessionQuery>, QueryRejection>,
) -> impl IntoResponse {
  let res = match read_query(q).and_then(|q| required_id(&q)) {
    Ok(id) => controller::regenerate(&state, id).await,
    Err(e) => Err(e),
  };
  respond(res.map(SessionOut::from))
}

/// `POST /api/math-problem/submit?id=` with `{problem, userAnswer}`.
#[instrument(level = "info", skip(state, q, body))]
pub async fn http_post_submit(
  State(state): State<Arc<AppState>>,
  q: Result<Query<SessionQuery>, QueryRejection>,
  body: Result<Json<SubmitIn>, JsonRejection>,
) -> impl IntoResponse {
  let res = submit_inner(&state, q, body).await;
  respond(res.map(SubmissionOut::from))
}

async fn submit_inner(
  state: &AppState,
  q: Result<Query<SessionQuery>, QueryRejection>,
  body: Result<Json<SubmitIn>, JsonRejection>,
) -> Result<crate::domain::Submission, AppError> {
  let id = required_id(&read_query(q)?)?;
  let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
  let problem_len = body.problem.as_ref().map_or(0, |p| p.len());
  info!(target: "session", %id, answer = body.user_answer, problem_len, "HTTP submit received");
  controller::submit(state, id, body.user_answer).await
}

fn read_query(q: Result<Query<SessionQuery>, QueryRejection>) -> Result<SessionQuery, AppError> {
  q.map(|Query(q)| q).map_err(|e| AppError::BadRequest(e.body_text()))
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
  Uuid::parse_str(raw.trim()).map_err(|_| AppError::BadRequest("session id is not a valid identifier".into()))
}

fn required_id(q: &SessionQuery) -> Result<Uuid, AppError> {
  match q.id.as_deref() {
    Some(raw) if !raw.is_empty() => parse_id(raw),
    _ => Err(AppError::BadRequest("missing session id".into())),
  }
}

fn respond<T: Serialize>(res: Result<T, AppError>) -> Json<Envelope<T>> {
  match res {
    Ok(data) => Json(Envelope::ok(data)),
    Err(e) => {
      warn!(target: "session", error = %e, "Request failed");
      Json(Envelope::fail(e.user_message()))
    }
  }
}
