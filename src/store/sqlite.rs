use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use super::{SessionStore, StoreError, SubmissionStore};
use crate::domain::{Judge, NewSubmission, Session, Submission};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

fn ser<E: core::fmt::Display>(e: E) -> StoreError {
    StoreError::Backend(format!("bad row: {e}"))
}

/// Map constraint violations onto the store's own error kinds.
fn db_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::Conflict;
        }
        if db.is_foreign_key_violation() {
            return StoreError::NotFound;
        }
    }
    StoreError::Backend(e.to_string())
}

fn map_session(row: &SqliteRow) -> Result<Session, StoreError> {
    let id: String = row.try_get("id").map_err(ser)?;
    Ok(Session {
        id: Uuid::parse_str(&id).map_err(ser)?,
        problem_text: row.try_get("problem_text").map_err(ser)?,
        correct_answer: row.try_get("correct_answer").map_err(ser)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(ser)?,
    })
}

fn map_submission(row: &SqliteRow) -> Result<Submission, StoreError> {
    let id: String = row.try_get("id").map_err(ser)?;
    let session_id: String = row.try_get("session_id").map_err(ser)?;
    let judged_by: String = row.try_get("judged_by").map_err(ser)?;
    Ok(Submission {
        id: Uuid::parse_str(&id).map_err(ser)?,
        session_id: Uuid::parse_str(&session_id).map_err(ser)?,
        user_answer: row.try_get("user_answer").map_err(ser)?,
        is_correct: row.try_get("is_correct").map_err(ser)?,
        feedback_text: row.try_get("feedback_text").map_err(ser)?,
        judged_by: Judge::parse(&judged_by).ok_or_else(|| ser(format!("judged_by = {judged_by}")))?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(ser)?,
    })
}

impl SqliteStore {
    /// Connect to SQLite using the given URL.
    ///
    /// In-memory databases live and die with their connection, so those get a
    /// single connection that is never recycled.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let in_memory = database_url.contains(":memory:");
        let mut opts = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .acquire_timeout(Duration::from_secs(5));
        if in_memory {
            opts = opts.idle_timeout(None).max_lifetime(None);
        }
        let pool = opts
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON;").execute(&mut *conn).await?;
                    sqlx::query("PRAGMA journal_mode = WAL;").execute(&mut *conn).await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;").execute(&mut *conn).await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Create tables if they do not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        run_migrations(&self.pool).await.map_err(|e| StoreError::Backend(e.to_string()))
    }
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
        ",
    )
    .execute(pool)
    .await?;

    let applied = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = 1")
        .fetch_optional(pool)
        .await?
        .is_some();
    if applied {
        debug!(target: "math_tutor", "Schema up to date");
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS math_problem_sessions (
                id TEXT PRIMARY KEY,
                problem_text TEXT NOT NULL,
                correct_answer REAL NOT NULL,
                created_at TEXT NOT NULL
            );
        ",
    )
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS math_problem_submissions (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL UNIQUE,
                user_answer REAL NOT NULL,
                is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
                feedback_text TEXT NOT NULL,
                judged_by TEXT NOT NULL CHECK (judged_by IN ('model', 'local')),
                created_at TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES math_problem_sessions(id)
            );
        ",
    )
    .execute(&mut *tx)
    .await?;
    sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (1, ?1)")
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    info!(target: "math_tutor", version = 1, "Applied schema migration");
    Ok(())
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn create(&self, problem_text: &str, correct_answer: f64) -> Result<Session, StoreError> {
        let session = Session {
            id: Uuid::new_v4(),
            problem_text: problem_text.to_string(),
            correct_answer,
            created_at: Utc::now(),
        };
        sqlx::query(
            r"
                INSERT INTO math_problem_sessions (id, problem_text, correct_answer, created_at)
                VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(session.id.to_string())
        .bind(&session.problem_text)
        .bind(session.correct_answer)
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(session)
    }

    async fn update(&self, id: Uuid, problem_text: &str, correct_answer: f64) -> Result<Session, StoreError> {
        let res = sqlx::query(
            r"
                UPDATE math_problem_sessions
                SET problem_text = ?2, correct_answer = ?3, created_at = ?4
                WHERE id = ?1
                  AND NOT EXISTS (SELECT 1 FROM math_problem_submissions WHERE session_id = ?1)
            ",
        )
        .bind(id.to_string())
        .bind(problem_text)
        .bind(correct_answer)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if res.rows_affected() == 0 {
            // Either the row is missing (get reports NotFound) or it is answered.
            self.get(id).await?;
            return Err(StoreError::Conflict);
        }
        self.get(id).await
    }

    async fn get(&self, id: Uuid) -> Result<Session, StoreError> {
        let row = sqlx::query(
            r"
                SELECT id, problem_text, correct_answer, created_at
                FROM math_problem_sessions
                WHERE id = ?1
            ",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(StoreError::NotFound)?;
        map_session(&row)
    }
}

#[async_trait]
impl SubmissionStore for SqliteStore {
    async fn create(&self, new: NewSubmission) -> Result<Submission, StoreError> {
        let submission = Submission {
            id: Uuid::new_v4(),
            session_id: new.session_id,
            user_answer: new.user_answer,
            is_correct: new.is_correct,
            feedback_text: new.feedback_text,
            judged_by: new.judged_by,
            created_at: Utc::now(),
        };
        sqlx::query(
            r"
                INSERT INTO math_problem_submissions (
                    id, session_id, user_answer, is_correct, feedback_text, judged_by, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(submission.id.to_string())
        .bind(submission.session_id.to_string())
        .bind(submission.user_answer)
        .bind(submission.is_correct)
        .bind(&submission.feedback_text)
        .bind(submission.judged_by.as_str())
        .bind(submission.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(submission)
    }

    async fn find_by_session(&self, session_id: Uuid) -> Result<Option<Submission>, StoreError> {
        let row = sqlx::query(
            r"
                SELECT id, session_id, user_answer, is_correct, feedback_text, judged_by, created_at
                FROM math_problem_submissions
                WHERE session_id = ?1
            ",
        )
        .bind(session_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(map_submission).transpose()
    }
}
