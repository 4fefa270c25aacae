//! Static registry of activities and their statistics tables.
//!
//! Maps an activity id to the attempt table that stores its per-choice
//! results and to the enumeration of legal choice values. Resolved once at
//! startup; everything that used to branch on hard-coded activity ids goes
//! through here instead.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;

/// How many distinct attempt numbers a session retains per activity; when a
/// new group would exceed this, the oldest group's rows are deleted.
pub const MAX_RETAINED_ATTEMPTS: i64 = 3;

/// Description of one activity-specific attempt table.
#[derive(Debug, Clone, Copy)]
pub struct AttemptTableSpec {
    /// SQL table name
    pub table: &'static str,
    /// Name of the choice column (`body_part`, `color`, ...)
    pub choice_column: &'static str,
    /// Legal choice values with their display names
    pub choices: &'static [(&'static str, &'static str)],
}

impl AttemptTableSpec {
    /// Whether a choice value belongs to this activity's choice set.
    pub fn is_known_choice(&self, choice: &str) -> bool {
        self.choices.iter().any(|(value, _)| *value == choice)
    }

    /// Display name for a choice value; unknown values fall back to the raw
    /// value.
    pub fn display_name<'a>(&'a self, choice: &'a str) -> &'a str {
        self.choices
            .iter()
            .find(|(value, _)| *value == choice)
            .map(|(_, display)| *display)
            .unwrap_or(choice)
    }

    /// Completion predicate for an attempt group: every defined choice value
    /// has a row.
    pub fn group_complete(&self, present: &HashSet<String>) -> bool {
        self.choices
            .iter()
            .all(|(value, _)| present.contains(*value))
    }
}

/// One catalog activity plus the table its statistics land in.
#[derive(Debug, Clone, Copy)]
pub struct ActivitySpec {
    pub id: i64,
    pub name: &'static str,
    pub instruction: &'static str,
    pub stats: AttemptTableSpec,
}

pub const ACTIVITIES: [ActivitySpec; 5] = [
    ActivitySpec {
        id: 1,
        name: "Touch the Correct Body Part",
        instruction: "The robot names one of its body parts. Touch the named \
                      part to score a right answer.",
        stats: AttemptTableSpec {
            table: "touch_body_part_stats",
            choice_column: "body_part",
            choices: &[
                ("left_hand", "Left Hand"),
                ("right_hand", "Right Hand"),
                ("left_bumper", "Left Bumper"),
                ("right_bumper", "Right Bumper"),
            ],
        },
    },
    ActivitySpec {
        id: 2,
        name: "Match the Color",
        instruction: "The robot shows a color and asks for the matching card. \
                      Hold up the card of the same color.",
        stats: AttemptTableSpec {
            table: "match_color_stats",
            choice_column: "color",
            choices: &[
                ("red", "Red"),
                ("yellow", "Yellow"),
                ("green", "Green"),
                ("blue", "Blue"),
            ],
        },
    },
    ActivitySpec {
        id: 3,
        name: "Find the Number",
        instruction: "The robot asks for a number between one and five. Show \
                      the number with your fingers.",
        stats: AttemptTableSpec {
            table: "find_number_stats",
            choice_column: "number",
            choices: &[("1", "1"), ("2", "2"), ("3", "3"), ("4", "4"), ("5", "5")],
        },
    },
    ActivitySpec {
        id: 4,
        name: "Find the Image",
        instruction: "The robot shows a picture. Say whether it is a \
                      vegetable, a fruit or an animal.",
        stats: AttemptTableSpec {
            table: "find_image_stats",
            choice_column: "image_type",
            choices: &[
                ("vegetable", "Vegetable"),
                ("fruit", "Fruit"),
                ("animal", "Animal"),
            ],
        },
    },
    ActivitySpec {
        id: 5,
        name: "Learn With Buttons",
        instruction: "The robot plays an animal sound. Press the button with \
                      the matching animal.",
        stats: AttemptTableSpec {
            table: "learn_with_buttons_stats",
            choice_column: "button",
            choices: &[("horse", "Horse"), ("cat", "Cat"), ("dog", "Dog")],
        },
    },
];

static REGISTRY: Lazy<HashMap<i64, &'static ActivitySpec>> =
    Lazy::new(|| ACTIVITIES.iter().map(|spec| (spec.id, spec)).collect());

/// Resolve an activity id to its spec; `None` for ids the catalog does not
/// know.
pub fn lookup(activity_id: i64) -> Option<&'static ActivitySpec> {
    REGISTRY.get(&activity_id).copied()
}
