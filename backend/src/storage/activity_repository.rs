use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::db::DbConnection;
use crate::domain::models::activity::Activity;
use crate::domain::registry;

/// SQLite-backed activity catalog repository
#[derive(Clone)]
pub struct ActivityRepository {
    db: DbConnection,
}

impl ActivityRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Insert every registry activity that is not already present. The
    /// catalog is static reference data; existing rows are left untouched.
    pub async fn seed_catalog(&self) -> Result<()> {
        for spec in &registry::ACTIVITIES {
            sqlx::query(
                "INSERT OR IGNORE INTO activities (id, name, instruction) VALUES (?, ?, ?)",
            )
            .bind(spec.id)
            .bind(spec.name)
            .bind(spec.instruction)
            .execute(self.db.pool())
            .await?;
        }
        Ok(())
    }

    /// Retrieve a specific activity by ID
    pub async fn get_activity(&self, activity_id: i64) -> Result<Option<Activity>> {
        let row = sqlx::query("SELECT * FROM activities WHERE id = ?")
            .bind(activity_id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(|r| row_to_activity(&r)))
    }

    /// List all activities ordered by id
    pub async fn list_activities(&self) -> Result<Vec<Activity>> {
        let rows = sqlx::query("SELECT * FROM activities ORDER BY id")
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows.iter().map(row_to_activity).collect())
    }
}

fn row_to_activity(row: &SqliteRow) -> Activity {
    Activity {
        id: row.get("id"),
        name: row.get("name"),
        instruction: row.get("instruction"),
    }
}
