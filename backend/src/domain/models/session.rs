use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scoring::{self, Level};

/// One (child, activity) performance record. There is at most one session
/// row per pair; a later run of the same activity re-stamps the timestamps
/// and adds new rows to the attempt history instead of creating a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub child_id: String,
    pub activity_id: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub total_right_answers: i64,
    pub total_wrong_answers: i64,
}

impl Session {
    pub fn score(&self) -> f64 {
        scoring::score(self.total_right_answers, self.total_wrong_answers)
    }

    pub fn level(&self) -> Level {
        scoring::level_for(self.score())
    }

    /// Whole minutes between start and stop; 0 while either timestamp is
    /// absent.
    pub fn duration_minutes(&self) -> i64 {
        match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) => (stop - start).num_minutes(),
            _ => 0,
        }
    }
}
