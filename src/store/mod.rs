//! Persistence seams for sessions and submissions.
//!
//! Two backends implement both traits: `SqliteStore` (sqlx) for real runs and
//! `MemoryStore` for tests and `DATABASE_URL=memory`. Each operation is a
//! single attempt against a single row.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{NewSubmission, Session, Submission};

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors surfaced by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    /// The session already has a submission.
    #[error("conflict")]
    Conflict,

    #[error("backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, problem_text: &str, correct_answer: f64) -> Result<Session, StoreError>;

    /// Replace the problem of an unanswered session.
    ///
    /// Fails with `NotFound` for an unknown id and `Conflict` once a submission exists.
    async fn update(&self, id: Uuid, problem_text: &str, correct_answer: f64) -> Result<Session, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Session, StoreError>;
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Record the single submission for a session (`Conflict` if one exists).
    async fn create(&self, new: NewSubmission) -> Result<Submission, StoreError>;

    async fn find_by_session(&self, session_id: Uuid) -> Result<Option<Submission>, StoreError>;
}

/// Both stores behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionStore>,
    pub submissions: Arc<dyn SubmissionStore>,
}

impl Storage {
    pub fn in_memory() -> Self {
        let repo = MemoryStore::new();
        Self { sessions: Arc::new(repo.clone()), submissions: Arc::new(repo) }
    }

    /// Connect to SQLite and apply migrations.
    pub async fn sqlite(database_url: &str) -> Result<Self, StoreError> {
        let repo = SqliteStore::connect(database_url).await?;
        repo.migrate().await?;
        Ok(Self { sessions: Arc::new(repo.clone()), submissions: Arc::new(repo) })
    }

    /// `memory` selects the in-process store; anything else is a sqlx URL.
    pub async fn from_url(database_url: &str) -> Result<Self, StoreError> {
        if database_url == "memory" {
            Ok(Self::in_memory())
        } else {
            Self::sqlite(database_url).await
        }
    }
}
