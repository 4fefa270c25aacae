use serde::{Deserialize, Serialize};

/// A catalog activity the device knows how to run. Static reference data;
/// seeded at startup, never created through the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    pub name: String,
    pub instruction: String,
}
