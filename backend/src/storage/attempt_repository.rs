use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::db::DbConnection;
use crate::domain::models::attempt::Attempt;
use crate::domain::registry::{AttemptTableSpec, MAX_RETAINED_ATTEMPTS};

/// Repository over the activity-specific attempt tables. Which table a call
/// touches is decided by the [`AttemptTableSpec`] resolved from the activity
/// registry; table and column names are static registry strings, never user
/// input.
#[derive(Clone)]
pub struct AttemptRepository {
    db: DbConnection,
}

impl AttemptRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Insert one per-choice attempt row, assigning its attempt-group number.
    ///
    /// The group number is a strictly increasing counter local to the
    /// session. A new group starts when the current group holds a row for
    /// every choice in the activity's choice set, or already holds a row for
    /// the incoming choice (a repeated choice can only mean a new round has
    /// begun, even if the device skipped some choices last round). Advancing
    /// past the retention cap deletes the oldest group's rows.
    ///
    /// Runs in one transaction so the number assignment, the retention
    /// delete and the insert are atomic. Returns the assigned group number.
    pub async fn record_attempt(
        &self,
        stats: &AttemptTableSpec,
        session_id: i64,
        choice: &str,
        right_answers: i64,
        wrong_answers: i64,
        recorded_at: DateTime<Utc>,
    ) -> Result<i64> {
        let mut tx = self.db.pool().begin().await?;

        let current: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT MAX(attempt_number) FROM {} WHERE session_id = ?",
            stats.table
        ))
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?;

        let number = match current {
            None => 1,
            Some(current) => {
                let rows = sqlx::query(&format!(
                    "SELECT {} FROM {} WHERE session_id = ? AND attempt_number = ?",
                    stats.choice_column, stats.table
                ))
                .bind(session_id)
                .bind(current)
                .fetch_all(&mut *tx)
                .await?;
                let present: HashSet<String> =
                    rows.iter().map(|row| row.get::<String, _>(0)).collect();

                if stats.group_complete(&present) || present.contains(choice) {
                    let numbers: Vec<i64> = sqlx::query_scalar(&format!(
                        "SELECT DISTINCT attempt_number FROM {} WHERE session_id = ? ORDER BY attempt_number",
                        stats.table
                    ))
                    .bind(session_id)
                    .fetch_all(&mut *tx)
                    .await?;

                    if numbers.len() as i64 >= MAX_RETAINED_ATTEMPTS {
                        sqlx::query(&format!(
                            "DELETE FROM {} WHERE session_id = ? AND attempt_number = ?",
                            stats.table
                        ))
                        .bind(session_id)
                        .bind(numbers[0])
                        .execute(&mut *tx)
                        .await?;
                    }

                    current + 1
                } else {
                    current
                }
            }
        };

        sqlx::query(&format!(
            "INSERT INTO {} (session_id, {}, attempt_number, right_answers, wrong_answers, recorded_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            stats.table, stats.choice_column
        ))
        .bind(session_id)
        .bind(choice)
        .bind(number)
        .bind(right_answers)
        .bind(wrong_answers)
        .bind(recorded_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(number)
    }

    /// All attempt rows for a session, ordered by attempt number ascending
    /// then choice, for the reporting read path.
    pub async fn attempts_for_session(
        &self,
        stats: &AttemptTableSpec,
        session_id: i64,
    ) -> Result<Vec<Attempt>> {
        let rows = sqlx::query(&format!(
            "SELECT id, session_id, {choice} AS choice, attempt_number, right_answers, wrong_answers, recorded_at \
             FROM {table} WHERE session_id = ? ORDER BY attempt_number ASC, {choice} ASC",
            choice = stats.choice_column,
            table = stats.table,
        ))
        .bind(session_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(row_to_attempt).collect())
    }

    /// The distinct attempt-group numbers currently retained for a session.
    pub async fn retained_attempt_numbers(
        &self,
        stats: &AttemptTableSpec,
        session_id: i64,
    ) -> Result<Vec<i64>> {
        let numbers = sqlx::query_scalar(&format!(
            "SELECT DISTINCT attempt_number FROM {} WHERE session_id = ? ORDER BY attempt_number",
            stats.table
        ))
        .bind(session_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(numbers)
    }
}

fn row_to_attempt(row: &SqliteRow) -> Attempt {
    Attempt {
        id: row.get("id"),
        session_id: row.get("session_id"),
        choice: row.get("choice"),
        attempt_number: row.get("attempt_number"),
        right_answers: row.get("right_answers"),
        wrong_answers: row.get("wrong_answers"),
        recorded_at: row.get::<DateTime<Utc>, _>("recorded_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::child::{Child, Gender};
    use crate::domain::registry;
    use crate::storage::{ActivityRepository, ChildRepository, SessionRepository};
    use chrono::NaiveDate;

    const COLORS: [&str; 4] = ["red", "yellow", "green", "blue"];

    async fn setup_test() -> (AttemptRepository, &'static AttemptTableSpec, i64) {
        let db = DbConnection::init_test().await.expect("test db");
        ActivityRepository::new(db.clone()).seed_catalog().await.expect("seed");

        let child = Child {
            id: "child::1".to_string(),
            name: "Lina".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(2018, 1, 12).unwrap(),
            gender: Gender::Female,
            learning_difficulty: "down syndrome".to_string(),
            created_at: Utc::now(),
        };
        ChildRepository::new(db.clone()).store_child(&child).await.expect("child");

        let session = SessionRepository::new(db.clone())
            .upsert_start(&child.id, 2, Utc::now())
            .await
            .expect("session");

        let stats = &registry::lookup(2).unwrap().stats;
        (AttemptRepository::new(db), stats, session.id)
    }

    async fn record(repo: &AttemptRepository, stats: &AttemptTableSpec, session: i64, choice: &str) -> i64 {
        repo.record_attempt(stats, session, choice, 3, 1, Utc::now())
            .await
            .expect("record")
    }

    #[tokio::test]
    async fn first_attempt_group_is_one() {
        let (repo, stats, session) = setup_test().await;
        assert_eq!(record(&repo, stats, session, "red").await, 1);
    }

    #[tokio::test]
    async fn incomplete_group_keeps_collecting_choices() {
        let (repo, stats, session) = setup_test().await;
        assert_eq!(record(&repo, stats, session, "red").await, 1);
        assert_eq!(record(&repo, stats, session, "blue").await, 1);
        assert_eq!(record(&repo, stats, session, "yellow").await, 1);
    }

    #[tokio::test]
    async fn complete_group_advances_the_counter() {
        let (repo, stats, session) = setup_test().await;
        for color in COLORS {
            assert_eq!(record(&repo, stats, session, color).await, 1);
        }
        assert_eq!(record(&repo, stats, session, "red").await, 2);
    }

    #[tokio::test]
    async fn repeated_choice_in_an_incomplete_group_starts_a_new_round() {
        let (repo, stats, session) = setup_test().await;
        // the device skipped yellow and green last round
        assert_eq!(record(&repo, stats, session, "red").await, 1);
        assert_eq!(record(&repo, stats, session, "blue").await, 1);

        assert_eq!(record(&repo, stats, session, "red").await, 2);
        assert_eq!(record(&repo, stats, session, "blue").await, 2);
    }

    #[tokio::test]
    async fn retention_window_drops_the_oldest_group() {
        let (repo, stats, session) = setup_test().await;
        for round in 1..=3 {
            for color in COLORS {
                assert_eq!(record(&repo, stats, session, color).await, round);
            }
        }

        // a fourth complete round pushes out group 1
        assert_eq!(record(&repo, stats, session, "red").await, 4);

        let numbers = repo
            .retained_attempt_numbers(stats, session)
            .await
            .expect("numbers");
        assert_eq!(numbers, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn attempts_read_back_in_group_order() {
        let (repo, stats, session) = setup_test().await;
        for color in COLORS {
            record(&repo, stats, session, color).await;
        }
        record(&repo, stats, session, "red").await;

        let attempts = repo.attempts_for_session(stats, session).await.expect("read");
        assert_eq!(attempts.len(), 5);
        assert!(attempts.windows(2).all(|w| w[0].attempt_number <= w[1].attempt_number));
        assert_eq!(attempts.last().unwrap().attempt_number, 2);
        assert_eq!(attempts.last().unwrap().choice, "red");
    }
}
