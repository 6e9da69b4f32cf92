//! Runtime configuration: environment variables plus an optional TOML file for prompts.
//!
//! See `TutorConfig` and `Prompts` for the expected TOML schema.

use serde::Deserialize;
use tracing::{error, info};

/// Values read from the environment at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
  pub port: u16,
  pub static_dir: String,
  /// sqlx URL, or `memory` for the in-process store.
  pub database_url: String,
  pub tutor: TutorConfig,
}

impl AppConfig {
  pub fn from_env() -> Self {
    let port = std::env::var("PORT")
      .ok()
      .and_then(|p| p.parse::<u16>().ok())
      .unwrap_or(3000);
    let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "./static".into());
    let database_url =
      std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://math_tutor.db?mode=rwc".into());
    let tutor = load_tutor_config_from_env().unwrap_or_default();
    Self { port, static_dir, database_url, tutor }
  }
}

/// Tunables accepted in the TOML file pointed to by TUTOR_CONFIG_PATH.
#[derive(Clone, Debug, Deserialize)]
pub struct TutorConfig {
  #[serde(default = "default_grade_level")]
  pub grade_level: String,
  #[serde(default = "default_temperature")]
  pub temperature: f32,
  #[serde(default)]
  pub prompts: Prompts,
}

fn default_grade_level() -> String { "Primary 5".into() }
fn default_temperature() -> f32 { 0.7 }

impl Default for TutorConfig {
  fn default() -> Self {
    Self { grade_level: default_grade_level(), temperature: default_temperature(), prompts: Prompts::default() }
  }
}

/// Prompts used by the model client. Override in TOML to tune tone or difficulty.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub problem_system: String,
  pub problem_user_template: String,
  pub feedback_system: String,
  pub feedback_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      problem_system: "You write math word problems for primary-school students. Respond ONLY with strict JSON.".into(),
      problem_user_template: "Generate a math problem suitable for a {grade_level} student. The answer must be a single number. Return JSON with fields: problem_text (string), correct_answer (number).".into(),
      feedback_system: "You are a patient primary-school math teacher. Judge the student's answer and explain briefly. Reply as compact JSON.".into(),
      feedback_user_template: "Problem: {problem}\nExpected answer: {correct_answer}\nStudent answer: {user_answer}\nReturn JSON {\"feedback\": string, \"correct_answer\": number, \"is_correct\": boolean}. Keep feedback under 60 words, encouraging, and show the key step when the answer is wrong.".into(),
    }
  }
}

/// Attempt to load `TutorConfig` from TUTOR_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_tutor_config_from_env() -> Option<TutorConfig> {
  let path = std::env::var("TUTOR_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_tutor_config(&s) {
      Ok(cfg) => {
        info!(target: "math_tutor", %path, grade_level = %cfg.grade_level, "Loaded tutor config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "math_tutor", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "math_tutor", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

pub fn parse_tutor_config(s: &str) -> Result<TutorConfig, toml::de::Error> {
  toml::from_str::<TutorConfig>(s)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_toml_yields_defaults() {
    let cfg = parse_tutor_config("").expect("empty is valid");
    assert_eq!(cfg.grade_level, "Primary 5");
    assert!((cfg.temperature - 0.7).abs() < f32::EPSILON);
    assert!(cfg.prompts.problem_user_template.contains("{grade_level}"));
  }

  #[test]
  fn partial_prompt_override_keeps_other_defaults() {
    let cfg = parse_tutor_config(
      r#"
        grade_level = "Primary 3"
        [prompts]
        problem_system = "Only JSON."
      "#,
    )
    .expect("valid toml");
    assert_eq!(cfg.grade_level, "Primary 3");
    assert_eq!(cfg.prompts.problem_system, "Only JSON.");
    assert_eq!(cfg.prompts.feedback_system, Prompts::default().feedback_system);
  }

  #[test]
  fn malformed_toml_is_an_error() {
    assert!(parse_tutor_config("grade_level = ").is_err());
  }
}
