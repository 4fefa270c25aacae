use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Domain model representing a child in the system.
///
/// The child's age is always derived from the date of birth and "now"; it is
/// never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Child {
    pub id: String,
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub learning_difficulty: String,
    pub created_at: DateTime<Utc>,
}

impl Child {
    /// Generate a unique ID for a child
    pub fn generate_id() -> String {
        format!("child::{}", uuid::Uuid::new_v4())
    }

    /// The child's current age in whole years.
    pub fn age(&self) -> i32 {
        self.age_on(Utc::now().date_naive())
    }

    /// Age in whole years on a given day: the year difference, minus one
    /// when the birthday has not yet occurred that year.
    pub fn age_on(&self, today: NaiveDate) -> i32 {
        let mut age = today.year() - self.date_of_birth.year();
        if (today.month(), today.day()) < (self.date_of_birth.month(), self.date_of_birth.day()) {
            age -= 1;
        }
        age
    }
}

/// Gender of a child as recorded on the intake form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            other => Err(anyhow::anyhow!("Unknown gender: {}", other)),
        }
    }
}
