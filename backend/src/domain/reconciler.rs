use chrono::{DateTime, Utc};
use log::{debug, warn};
use shared::PerformanceReport;

use crate::db::DbConnection;
use crate::domain::models::session::Session;
use crate::domain::registry;
use crate::error::CoordinatorError;
use crate::storage::{AttemptRepository, SessionRepository};

/// What an ingest pass did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub rows_written: usize,
    pub total_right: i64,
    pub total_wrong: i64,
}

/// Maps a raw per-choice performance report onto the typed attempt tables
/// and the session's aggregate counters.
#[derive(Clone)]
pub struct StatsReconciler {
    sessions: SessionRepository,
    attempts: AttemptRepository,
}

impl StatsReconciler {
    pub fn new(db: DbConnection) -> Self {
        Self {
            sessions: SessionRepository::new(db.clone()),
            attempts: AttemptRepository::new(db),
        }
    }

    /// Ingest one report for a session.
    ///
    /// One new attempt row per choice reported under `right_answers`, with a
    /// missing `wrong_answers` entry defaulting to 0; a choice with zero
    /// right and zero wrong answers was not attempted this round and is not
    /// written. Rows are created, never updated; the attempt table's
    /// save-time logic assigns group numbers and enforces the retention
    /// window. Session aggregates are set from the sums over all choices in
    /// the report, even when the activity id resolves to no attempt table.
    pub async fn ingest(
        &self,
        session: &Session,
        report: &PerformanceReport,
        at: DateTime<Utc>,
    ) -> Result<IngestSummary, CoordinatorError> {
        let mut rows_written = 0;

        match registry::lookup(session.activity_id) {
            None => {
                warn!(
                    "No attempt table for activity {}; keeping session aggregates only",
                    session.activity_id
                );
            }
            Some(spec) => {
                for (choice, &right) in &report.right_answers {
                    let wrong = report.wrong_for(choice);
                    if right == 0 && wrong == 0 {
                        continue;
                    }
                    if !spec.stats.is_known_choice(choice) {
                        warn!(
                            "Discarding unknown choice '{}' for activity {}",
                            choice, session.activity_id
                        );
                        continue;
                    }

                    let number = self
                        .attempts
                        .record_attempt(&spec.stats, session.id, choice, right, wrong, at)
                        .await?;
                    debug!(
                        "Recorded attempt {} for session {} choice {}",
                        number, session.id, choice
                    );
                    rows_written += 1;
                }
            }
        }

        let total_right = report.total_right();
        let total_wrong = report.total_wrong();
        self.sessions
            .set_totals(session.id, total_right, total_wrong)
            .await?;

        Ok(IngestSummary {
            rows_written,
            total_right,
            total_wrong,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::child::{Child, Gender};
    use crate::storage::{ActivityRepository, ChildRepository};
    use chrono::NaiveDate;

    async fn setup_test(activity_id: i64) -> (DbConnection, StatsReconciler, Session) {
        let db = DbConnection::init_test().await.expect("test db");
        ActivityRepository::new(db.clone()).seed_catalog().await.expect("seed");

        let child = Child {
            id: Child::generate_id(),
            name: "Omar".to_string(),
            gender: Gender::Male,
            date_of_birth: NaiveDate::from_ymd_opt(2017, 7, 7).unwrap(),
            learning_difficulty: "adhd".to_string(),
            created_at: Utc::now(),
        };
        ChildRepository::new(db.clone()).store_child(&child).await.expect("child");

        // sessions table tolerates ids outside the catalog only when the
        // activity row exists; insert a bare row for the unknown-id case
        if registry::lookup(activity_id).is_none() {
            sqlx::query("INSERT INTO activities (id, name, instruction) VALUES (?, 'Legacy', '')")
                .bind(activity_id)
                .execute(db.pool())
                .await
                .expect("legacy activity");
        }

        let session = SessionRepository::new(db.clone())
            .upsert_start(&child.id, activity_id, Utc::now())
            .await
            .expect("session");

        (db.clone(), StatsReconciler::new(db), session)
    }

    fn report(right: &[(&str, i64)], wrong: &[(&str, i64)]) -> PerformanceReport {
        PerformanceReport {
            right_answers: right.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            wrong_answers: wrong.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[tokio::test]
    async fn ingest_writes_rows_and_aggregates() {
        let (db, reconciler, session) = setup_test(2).await;

        let summary = reconciler
            .ingest(&session, &report(&[("red", 5), ("blue", 2)], &[("red", 1)]), Utc::now())
            .await
            .expect("ingest");

        assert_eq!(
            summary,
            IngestSummary { rows_written: 2, total_right: 7, total_wrong: 1 }
        );

        let stats = &registry::lookup(2).unwrap().stats;
        let attempts = AttemptRepository::new(db.clone())
            .attempts_for_session(stats, session.id)
            .await
            .expect("attempts");
        assert_eq!(attempts.len(), 2);

        let red = attempts.iter().find(|a| a.choice == "red").unwrap();
        assert_eq!((red.right_answers, red.wrong_answers), (5, 1));
        let blue = attempts.iter().find(|a| a.choice == "blue").unwrap();
        assert_eq!((blue.right_answers, blue.wrong_answers), (2, 0));

        let fresh = SessionRepository::new(db)
            .get_session(&session.child_id, 2)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(fresh.total_right_answers, 7);
        assert_eq!(fresh.total_wrong_answers, 1);
    }

    #[tokio::test]
    async fn unattempted_choices_are_not_written() {
        let (db, reconciler, session) = setup_test(2).await;

        let summary = reconciler
            .ingest(&session, &report(&[("red", 0), ("blue", 3)], &[]), Utc::now())
            .await
            .expect("ingest");
        assert_eq!(summary.rows_written, 1);

        let stats = &registry::lookup(2).unwrap().stats;
        let attempts = AttemptRepository::new(db)
            .attempts_for_session(stats, session.id)
            .await
            .expect("attempts");
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].choice, "blue");
    }

    #[tokio::test]
    async fn unknown_choice_is_skipped_but_counted_in_aggregates() {
        let (db, reconciler, session) = setup_test(2).await;

        let summary = reconciler
            .ingest(&session, &report(&[("purple", 4), ("red", 2)], &[]), Utc::now())
            .await
            .expect("ingest");

        assert_eq!(summary.rows_written, 1);
        assert_eq!(summary.total_right, 6);

        let fresh = SessionRepository::new(db)
            .get_session(&session.child_id, 2)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(fresh.total_right_answers, 6);
    }

    #[tokio::test]
    async fn unknown_activity_updates_aggregates_only() {
        let (db, reconciler, session) = setup_test(77).await;

        let summary = reconciler
            .ingest(&session, &report(&[("red", 3)], &[("red", 2)]), Utc::now())
            .await
            .expect("ingest");

        assert_eq!(summary.rows_written, 0);
        let fresh = SessionRepository::new(db)
            .get_session(&session.child_id, 77)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(fresh.total_right_answers, 3);
        assert_eq!(fresh.total_wrong_answers, 2);
    }
}
