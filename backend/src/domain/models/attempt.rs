use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scoring::{self, Level};

/// One per-choice result row within a session's bounded attempt history.
///
/// The choice value is the activity-specific dimension being scored (a body
/// part, color, number, image type or button). Rows are unique per
/// (session, attempt number, choice) and at most three attempt numbers are
/// retained per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub session_id: i64,
    pub choice: String,
    pub attempt_number: i64,
    pub right_answers: i64,
    pub wrong_answers: i64,
    pub recorded_at: DateTime<Utc>,
}

impl Attempt {
    pub fn score(&self) -> f64 {
        scoring::score(self.right_answers, self.wrong_answers)
    }

    pub fn level(&self) -> Level {
        scoring::level_for(self.score())
    }
}
