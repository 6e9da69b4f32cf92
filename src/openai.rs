//! Minimal OpenAI client for our use-cases.
//!
//! We only call chat.completions with a strict `json_schema` response format and
//! run every reply through the matching `OutputShape` before trusting it.
//! Calls are instrumented and log model name, latency and token usage (not contents).
//!
//! NOTE: We never log the API key and we keep payload previews short.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::config::TutorConfig;
use crate::domain::{Evaluation, GeneratedProblem, Judge};
use crate::generator::{GenerationError, Generator};
use crate::shape::{OutputShape, FEEDBACK_SHAPE, PROBLEM_SHAPE};
use crate::util::{fill_template, format_answer, trunc_for_log};

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub tutor: TutorConfig,
}

#[derive(Deserialize)]
struct Verdict {
  feedback: String,
  correct_answer: f64,
  is_correct: bool,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env(tutor: TutorConfig) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    Self::new(api_key, base_url, model, tutor)
  }

  pub fn new(api_key: String, base_url: String, model: String, tutor: TutorConfig) -> Option<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;
    Some(Self { client, api_key, base_url: base_url.trim_end_matches('/').to_string(), model, tutor })
  }

  /// Schema-constrained chat completion, checked against `shape` and decoded into T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model, shape = shape.name))]
  async fn chat_shaped<T: DeserializeOwned>(
    &self,
    shape: &OutputShape,
    system: &str,
    user: &str,
  ) -> Result<T, GenerationError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature: self.tutor.temperature,
      response_format: Some(ResponseFormat::schema(shape)),
    };

    let start = std::time::Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "math-tutor-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| GenerationError::Transport(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      error!(elapsed = ?start.elapsed(), status, "Model call rejected");
      return Err(GenerationError::Status { status, message });
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| GenerationError::Transport(e.to_string()))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();
    info!(elapsed = ?start.elapsed(), reply_len = text.len(), "Model response received");

    Ok(shape.parse::<T>(&text)?)
  }
}

#[async_trait]
impl Generator for OpenAI {
  #[instrument(level = "info", skip(self), fields(grade_level = %self.tutor.grade_level))]
  async fn generate_problem(&self) -> Result<GeneratedProblem, GenerationError> {
    let prompts = &self.tutor.prompts;
    let user = fill_template(&prompts.problem_user_template, &[("grade_level", &self.tutor.grade_level)]);
    let raw: GeneratedProblem = self.chat_shaped(&PROBLEM_SHAPE, &prompts.problem_system, &user).await?;
    let problem = check_problem(raw)?;
    info!(
      preview = %trunc_for_log(&problem.problem_text, 40),
      "Math problem generated"
    );
    Ok(problem)
  }

  #[instrument(level = "info", skip(self, problem_text), fields(problem_len = problem_text.len()))]
  async fn evaluate(
    &self,
    problem_text: &str,
    correct_answer: f64,
    user_answer: f64,
  ) -> Result<Evaluation, GenerationError> {
    let prompts = &self.tutor.prompts;
    let user = fill_template(
      &prompts.feedback_user_template,
      &[
        ("problem", problem_text),
        ("correct_answer", &format_answer(correct_answer)),
        ("user_answer", &format_answer(user_answer)),
      ],
    );
    let v: Verdict = self.chat_shaped(&FEEDBACK_SHAPE, &prompts.feedback_system, &user).await?;
    if v.feedback.trim().is_empty() {
      return Err(GenerationError::Invalid("empty feedback".into()));
    }
    if !reported_answer_agrees(v.correct_answer, correct_answer) {
      warn!(
        target: "session",
        reported = v.correct_answer,
        stored = correct_answer,
        "Model reported a different correct answer; its verdict may be unreliable"
      );
    }
    Ok(Evaluation { is_correct: v.is_correct, feedback_text: v.feedback.trim().to_string(), judged_by: Judge::Model })
  }
}

/// Exact comparison, same rule as the local grader.
fn reported_answer_agrees(reported: f64, stored: f64) -> bool {
  reported == stored
}

/// Reject replies that fit the layout but are useless as a problem.
fn check_problem(p: GeneratedProblem) -> Result<GeneratedProblem, GenerationError> {
  let text = p.problem_text.trim();
  if text.is_empty() {
    return Err(GenerationError::Invalid("empty problem_text".into()));
  }
  if !p.correct_answer.is_finite() {
    return Err(GenerationError::Invalid("correct_answer is not finite".into()));
  }
  Ok(GeneratedProblem { problem_text: text.to_string(), correct_answer: p.correct_answer })
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat {
  #[serde(rename = "type")] r#type: String,
  #[serde(skip_serializing_if = "Option::is_none")] json_schema: Option<JsonSchemaSpec>,
}
#[derive(Serialize)]
struct JsonSchemaSpec { name: String, schema: serde_json::Value, strict: bool }

impl ResponseFormat {
  fn schema(shape: &OutputShape) -> Self {
    Self {
      r#type: "json_schema".into(),
      json_schema: Some(JsonSchemaSpec { name: shape.name.into(), schema: shape.json_schema(), strict: true }),
    }
  }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
