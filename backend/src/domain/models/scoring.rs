//! Score and level derivation shared by sessions and attempts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Categorical bucket of a score. The same boundaries apply at session and
/// attempt level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    Excellent,
    Good,
    Average,
    NeedsImprovement,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Level::Excellent => "Excellent",
            Level::Good => "Good",
            Level::Average => "Average",
            Level::NeedsImprovement => "Needs Improvement",
        };
        write!(f, "{}", label)
    }
}

/// Percentage of right answers: `100 * right / (right + wrong)`, 0 when no
/// answers were recorded at all.
pub fn score(right_answers: i64, wrong_answers: i64) -> f64 {
    let total = right_answers + wrong_answers;
    if total == 0 {
        return 0.0;
    }
    100.0 * right_answers as f64 / total as f64
}

/// Bucket a score: above 90 is "Excellent", 70 up to 90 "Good", 50 up to 70
/// "Average", anything below "Needs Improvement".
pub fn level_for(score: f64) -> Level {
    if score > 90.0 {
        Level::Excellent
    } else if score >= 70.0 {
        Level::Good
    } else if score >= 50.0 {
        Level::Average
    } else {
        Level::NeedsImprovement
    }
}
