use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{SessionStore, StoreError, SubmissionStore};
use crate::domain::{NewSubmission, Session, Submission};

/// In-process store. Sessions and submissions share one handle so `update`
/// can see whether a session has been answered.
#[derive(Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    // keyed by session id: at most one submission per session
    submissions: Arc<RwLock<HashMap<Uuid, Submission>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, problem_text: &str, correct_answer: f64) -> Result<Session, StoreError> {
        let session = Session {
            id: Uuid::new_v4(),
            problem_text: problem_text.to_string(),
            correct_answer,
            created_at: Utc::now(),
        };
        self.sessions.write().await.insert(session.id, session.clone());
        Ok(session)
    }

    async fn update(&self, id: Uuid, problem_text: &str, correct_answer: f64) -> Result<Session, StoreError> {
        // Lock order: submissions, then sessions.
        let submissions = self.submissions.read().await;
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(StoreError::NotFound)?;
        if submissions.contains_key(&id) {
            return Err(StoreError::Conflict);
        }
        session.problem_text = problem_text.to_string();
        session.correct_answer = correct_answer;
        session.created_at = Utc::now();
        Ok(session.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Session, StoreError> {
        self.sessions.read().await.get(&id).cloned().ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn create(&self, new: NewSubmission) -> Result<Submission, StoreError> {
        let mut submissions = self.submissions.write().await;
        if !self.sessions.read().await.contains_key(&new.session_id) {
            return Err(StoreError::NotFound);
        }
        if submissions.contains_key(&new.session_id) {
            return Err(StoreError::Conflict);
        }
        let submission = Submission {
            id: Uuid::new_v4(),
            session_id: new.session_id,
            user_answer: new.user_answer,
            is_correct: new.is_correct,
            feedback_text: new.feedback_text,
            judged_by: new.judged_by,
            created_at: Utc::now(),
        };
        submissions.insert(submission.session_id, submission.clone());
        Ok(submission)
    }

    async fn find_by_session(&self, session_id: Uuid) -> Result<Option<Submission>, StoreError> {
        Ok(self.submissions.read().await.get(&session_id).cloned())
    }
}
