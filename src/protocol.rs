//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::controller::SessionView;
use crate::domain::{Judge, SessionStatus, Submission};

/// `{success: 0|1, message: <payload | string>}` on every API response.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: u8,
    pub message: Message<T>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Message<T: Serialize> {
    Data(T),
    Text(String),
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self { success: 1, message: Message::Data(data) }
    }

    pub fn fail(text: impl Into<String>) -> Self {
        Self { success: 0, message: Message::Text(text.into()) }
    }
}

/// Session as delivered to the client.
#[derive(Debug, Serialize)]
pub struct SessionOut {
    pub id: Uuid,
    pub problem_text: String,
    pub correct_answer: f64,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
}

impl From<SessionView> for SessionOut {
    fn from(v: SessionView) -> Self {
        Self {
            id: v.session.id,
            problem_text: v.session.problem_text,
            correct_answer: v.session.correct_answer,
            created_at: v.session.created_at,
            status: v.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmissionOut {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_answer: f64,
    pub is_correct: bool,
    pub feedback_text: String,
    pub judged_by: Judge,
    pub created_at: DateTime<Utc>,
}

impl From<Submission> for SubmissionOut {
    fn from(s: Submission) -> Self {
        Self {
            id: s.id,
            session_id: s.session_id,
            user_answer: s.user_answer,
            is_correct: s.is_correct,
            feedback_text: s.feedback_text,
            judged_by: s.judged_by,
            created_at: s.created_at,
        }
    }
}

//
// HTTP request DTOs
//

/// `?id=` on both problem and submit endpoints. Kept as a string so a
/// malformed id becomes an envelope failure instead of a 400 rejection.
#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitIn {
    /// Echo of the displayed problem; the stored problem text is what gets judged.
    #[serde(default)]
    pub problem: Option<String>,
    #[serde(rename = "userAnswer")]
    pub user_answer: f64,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_envelope_carries_plain_message() {
        let v = serde_json::to_value(Envelope::<SessionOut>::fail("nope")).unwrap();
        assert_eq!(v, json!({ "success": 0, "message": "nope" }));
    }

    #[test]
    fn success_envelope_inlines_payload() {
        let v = serde_json::to_value(Envelope::ok(HealthOut { ok: true })).unwrap();
        assert_eq!(v, json!({ "success": 1, "message": { "ok": true } }));
    }

    #[test]
    fn submit_body_uses_camel_case_answer() {
        let b: SubmitIn = serde_json::from_value(json!({ "problem": "What is 3+5?", "userAnswer": 8 })).unwrap();
        assert_eq!(b.user_answer, 8.0);
        assert_eq!(b.problem.as_deref(), Some("What is 3+5?"));
    }
}
