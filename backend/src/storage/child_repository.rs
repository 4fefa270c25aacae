use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::db::DbConnection;
use crate::domain::models::child::{Child, Gender};

/// SQLite-backed child repository
#[derive(Clone)]
pub struct ChildRepository {
    db: DbConnection,
}

impl ChildRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Store a new child
    pub async fn store_child(&self, child: &Child) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO children (id, name, date_of_birth, gender, learning_difficulty, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&child.id)
        .bind(&child.name)
        .bind(child.date_of_birth)
        .bind(child.gender.as_str())
        .bind(&child.learning_difficulty)
        .bind(child.created_at)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Retrieve a specific child by ID
    pub async fn get_child(&self, child_id: &str) -> Result<Option<Child>> {
        let row = sqlx::query("SELECT * FROM children WHERE id = ?")
            .bind(child_id)
            .fetch_optional(self.db.pool())
            .await?;

        row.map(|r| row_to_child(&r)).transpose()
    }

    /// List all children ordered by name
    pub async fn list_children(&self) -> Result<Vec<Child>> {
        let rows = sqlx::query("SELECT * FROM children ORDER BY name")
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(row_to_child).collect()
    }

    /// Delete a child by ID. The schema cascades the delete to the child's
    /// sessions and attempt rows. Returns false when no such child existed.
    pub async fn delete_child(&self, child_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM children WHERE id = ?")
            .bind(child_id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_child(row: &SqliteRow) -> Result<Child> {
    let gender: String = row.get("gender");
    Ok(Child {
        id: row.get("id"),
        name: row.get("name"),
        date_of_birth: row.get::<NaiveDate, _>("date_of_birth"),
        gender: gender.parse::<Gender>()?,
        learning_difficulty: row.get("learning_difficulty"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}
