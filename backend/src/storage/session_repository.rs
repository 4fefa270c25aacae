use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::db::DbConnection;
use crate::domain::models::session::Session;

/// SQLite-backed session repository
#[derive(Clone)]
pub struct SessionRepository {
    db: DbConnection,
}

impl SessionRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Create the (child, activity) session row or re-stamp an existing one.
    ///
    /// A single atomic upsert so that concurrent starts for the same pair
    /// can never produce two rows. Starting clears any previous stop time:
    /// the pair begins a fresh timing window on its one session row.
    pub async fn upsert_start(
        &self,
        child_id: &str,
        activity_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<Session> {
        sqlx::query(
            r#"
            INSERT INTO sessions (child_id, activity_id, started_at, stopped_at)
            VALUES (?, ?, ?, NULL)
            ON CONFLICT (child_id, activity_id)
            DO UPDATE SET started_at = excluded.started_at, stopped_at = NULL
            "#,
        )
        .bind(child_id)
        .bind(activity_id)
        .bind(started_at)
        .execute(self.db.pool())
        .await?;

        self.get_session(child_id, activity_id)
            .await?
            .context("session row missing immediately after upsert")
    }

    /// Fetch the session for a (child, activity) pair
    pub async fn get_session(&self, child_id: &str, activity_id: i64) -> Result<Option<Session>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE child_id = ? AND activity_id = ?")
            .bind(child_id)
            .bind(activity_id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(|r| row_to_session(&r)))
    }

    /// Stamp the stop time. Called on every stop outcome, result or not, so
    /// duration reporting degrades gracefully instead of leaving stale state.
    pub async fn set_stopped(&self, session_id: i64, stopped_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE sessions SET stopped_at = ? WHERE id = ?")
            .bind(stopped_at)
            .bind(session_id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Set the aggregate answer counters
    pub async fn set_totals(&self, session_id: i64, right: i64, wrong: i64) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET total_right_answers = ?, total_wrong_answers = ? WHERE id = ?",
        )
        .bind(right)
        .bind(wrong)
        .bind(session_id)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}

fn row_to_session(row: &SqliteRow) -> Session {
    Session {
        id: row.get("id"),
        child_id: row.get("child_id"),
        activity_id: row.get("activity_id"),
        started_at: row.get::<Option<DateTime<Utc>>, _>("started_at"),
        stopped_at: row.get::<Option<DateTime<Utc>>, _>("stopped_at"),
        total_right_answers: row.get("total_right_answers"),
        total_wrong_answers: row.get("total_wrong_answers"),
    }
}
