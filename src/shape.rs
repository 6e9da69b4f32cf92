//! Requested output shapes for model calls.
//!
//! A shape is a flat record layout (field name + JSON kind). It is rendered as a
//! JSON schema for the request and checked against the raw reply before any
//! typed deserialization, so a model that drifts from the layout produces a
//! `ShapeError` instead of a half-filled struct.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::util::strip_code_fence;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
  String,
  Number,
  Boolean,
}

impl FieldKind {
  fn schema_type(self) -> &'static str {
    match self {
      FieldKind::String => "string",
      FieldKind::Number => "number",
      FieldKind::Boolean => "boolean",
    }
  }

  fn accepts(self, v: &Value) -> bool {
    match self {
      FieldKind::String => v.is_string(),
      FieldKind::Number => v.is_number(),
      FieldKind::Boolean => v.is_boolean(),
    }
  }
}

#[derive(Debug, Error, PartialEq)]
pub enum ShapeError {
  #[error("reply is empty")]
  Empty,
  #[error("reply is not JSON: {0}")]
  NotJson(String),
  #[error("reply is not a JSON object")]
  NotObject,
  #[error("missing field `{0}`")]
  MissingField(&'static str),
  #[error("field `{field}` should be a {expected}")]
  WrongKind { field: &'static str, expected: &'static str },
  #[error("reply does not fit `{shape}`: {message}")]
  Decode { shape: &'static str, message: String },
}

#[derive(Clone, Copy, Debug)]
pub struct OutputShape {
  pub name: &'static str,
  pub fields: &'static [(&'static str, FieldKind)],
}

/// `{problem_text: string, correct_answer: number}`
pub const PROBLEM_SHAPE: OutputShape = OutputShape {
  name: "math_problem",
  fields: &[
    ("problem_text", FieldKind::String),
    ("correct_answer", FieldKind::Number),
  ],
};

/// `{feedback: string, correct_answer: number, is_correct: boolean}`
pub const FEEDBACK_SHAPE: OutputShape = OutputShape {
  name: "answer_feedback",
  fields: &[
    ("feedback", FieldKind::String),
    ("correct_answer", FieldKind::Number),
    ("is_correct", FieldKind::Boolean),
  ],
};

impl OutputShape {
  /// Strict JSON schema for the `json_schema` response format.
  pub fn json_schema(&self) -> Value {
    let mut props = Map::new();
    for (name, kind) in self.fields {
      props.insert((*name).to_string(), json!({ "type": kind.schema_type() }));
    }
    let required: Vec<&str> = self.fields.iter().map(|(n, _)| *n).collect();
    json!({
      "type": "object",
      "properties": props,
      "required": required,
      "additionalProperties": false,
    })
  }

  /// Check the layout of `text`, then deserialize it into `T`.
  /// Extra fields are tolerated; missing or mistyped ones are not.
  pub fn parse<T: DeserializeOwned>(&self, text: &str) -> Result<T, ShapeError> {
    let body = strip_code_fence(text);
    if body.is_empty() {
      return Err(ShapeError::Empty);
    }
    let value: Value = serde_json::from_str(body).map_err(|e| ShapeError::NotJson(e.to_string()))?;
    let obj = value.as_object().ok_or(ShapeError::NotObject)?;
    for (name, kind) in self.fields {
      match obj.get(*name) {
        None | Some(Value::Null) => return Err(ShapeError::MissingField(*name)),
        Some(v) if !kind.accepts(v) => {
          return Err(ShapeError::WrongKind { field: *name, expected: kind.schema_type() })
        }
        Some(_) => {}
      }
    }
    serde_json::from_value(value).map_err(|e| ShapeError::Decode { shape: self.name, message: e.to_string() })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::GeneratedProblem;

  #[test]
  fn parses_reply_matching_problem_shape() {
    let p: GeneratedProblem = PROBLEM_SHAPE
      .parse(r#"{"problem_text":"What is 3+5?","correct_answer":8}"#)
      .expect("valid");
    assert_eq!(p.problem_text, "What is 3+5?");
    assert_eq!(p.correct_answer, 8.0);
  }

  #[test]
  fn accepts_fenced_reply() {
    let p: GeneratedProblem = PROBLEM_SHAPE
      .parse("```json\n{\"problem_text\":\"1/2 of 10?\",\"correct_answer\":5}\n```")
      .expect("fenced");
    assert_eq!(p.correct_answer, 5.0);
  }

  #[test]
  fn rejects_missing_and_mistyped_fields() {
    let err = PROBLEM_SHAPE.parse::<GeneratedProblem>(r#"{"problem_text":"x"}"#).unwrap_err();
    assert_eq!(err, ShapeError::MissingField("correct_answer"));

    let err = PROBLEM_SHAPE
      .parse::<GeneratedProblem>(r#"{"problem_text":"x","correct_answer":"8"}"#)
      .unwrap_err();
    assert_eq!(err, ShapeError::WrongKind { field: "correct_answer", expected: "number" });
  }

  #[test]
  fn rejects_non_json_and_non_object() {
    assert!(matches!(
      PROBLEM_SHAPE.parse::<GeneratedProblem>("Sure! Here is a problem"),
      Err(ShapeError::NotJson(_))
    ));
    assert_eq!(PROBLEM_SHAPE.parse::<GeneratedProblem>("[1,2]").unwrap_err(), ShapeError::NotObject);
    assert_eq!(PROBLEM_SHAPE.parse::<GeneratedProblem>("   ").unwrap_err(), ShapeError::Empty);
  }

  #[test]
  fn schema_lists_every_field_as_required() {
    let schema = FEEDBACK_SHAPE.json_schema();
    assert_eq!(schema["required"], json!(["feedback", "correct_answer", "is_correct"]));
    assert_eq!(schema["properties"]["is_correct"]["type"], "boolean");
    assert_eq!(schema["additionalProperties"], false);
  }
}
