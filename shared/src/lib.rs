use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Performance data reported by the device when an activity run ends.
///
/// Published as JSON on `activity/performance/<activity_id>`:
/// `{"right_answers": {"red": 5, ...}, "wrong_answers": {"red": 1, ...}}`.
/// Keys are the activity's choice dimension (body part, color, number,
/// image type or button); a choice absent from both maps was not attempted
/// this round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    #[serde(default)]
    pub right_answers: BTreeMap<String, i64>,
    #[serde(default)]
    pub wrong_answers: BTreeMap<String, i64>,
}

impl PerformanceReport {
    /// Sum of right answers over every choice present in the report.
    pub fn total_right(&self) -> i64 {
        self.right_answers.values().sum()
    }

    /// Sum of wrong answers over every choice present in the report.
    pub fn total_wrong(&self) -> i64 {
        self.wrong_answers.values().sum()
    }

    /// Wrong-answer count for a choice, defaulting to 0 when the device
    /// omitted the choice from `wrong_answers`.
    pub fn wrong_for(&self, choice: &str) -> i64 {
        self.wrong_answers.get(choice).copied().unwrap_or(0)
    }
}

/// Request body for creating a child record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateChildRequest {
    pub name: String,
    /// Date of birth (ISO 8601: YYYY-MM-DD)
    pub date_of_birth: String,
    /// "male" or "female"
    pub gender: String,
    /// Free-text learning difficulty note
    pub learning_difficulty: String,
}

/// A child record as returned by the API. `age` is derived from the date of
/// birth at response time and is never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildDto {
    pub id: String,
    pub name: String,
    pub date_of_birth: String,
    pub gender: String,
    pub learning_difficulty: String,
    pub age: i32,
}

/// A catalog activity the device knows how to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDto {
    pub id: i64,
    pub name: String,
    pub instruction: String,
}

/// Request body for starting or stopping a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub child_id: String,
}

/// Aggregate view of one (child, activity) session row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub child_id: String,
    pub activity_id: i64,
    /// RFC 3339 timestamps; absent until the corresponding signal was sent
    pub started_at: Option<String>,
    pub stopped_at: Option<String>,
    pub total_right_answers: i64,
    pub total_wrong_answers: i64,
    /// Whole minutes between start and stop; 0 while either is absent
    pub duration_minutes: i64,
    pub score: f64,
    pub level: String,
}

/// Response for a stop request. `data_received` is false when the device
/// reported nothing within the result window ("no data for this run").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopSessionResponse {
    pub session: SessionSummary,
    pub data_received: bool,
}

/// One per-choice attempt row within a session's bounded history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptDto {
    pub attempt_number: i64,
    pub right_answers: i64,
    pub wrong_answers: i64,
    pub score: f64,
    pub level: String,
    pub recorded_at: String,
}

/// Attempt history for a single choice, ordered by attempt number ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceHistory {
    pub choice: String,
    /// Human-readable choice name ("left_hand" -> "Left Hand")
    pub display_name: String,
    pub attempts: Vec<AttemptDto>,
}

/// Full report for one (child, activity) session: the aggregate summary plus
/// the retained per-choice attempt history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session: SessionSummary,
    pub choices: Vec<ChoiceHistory>,
}
