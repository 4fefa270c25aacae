use anyhow::Context;
use chrono::{NaiveDate, Utc};
use log::{info, warn};

use crate::db::DbConnection;
use crate::domain::models::child::{Child, Gender};
use crate::error::CoordinatorError;
use crate::storage::ChildRepository;

/// Command to register a new child
#[derive(Debug, Clone)]
pub struct CreateChildCommand {
    pub name: String,
    /// ISO 8601 date (YYYY-MM-DD)
    pub date_of_birth: String,
    /// "male" or "female"
    pub gender: String,
    pub learning_difficulty: String,
}

/// Service for managing child records
#[derive(Clone)]
pub struct ChildService {
    children: ChildRepository,
}

impl ChildService {
    pub fn new(db: DbConnection) -> Self {
        Self {
            children: ChildRepository::new(db),
        }
    }

    /// Create a new child
    pub async fn create_child(&self, command: CreateChildCommand) -> Result<Child, CoordinatorError> {
        info!("Creating child: name={}", command.name);

        let name = command.name.trim().to_string();
        if name.is_empty() {
            return Err(CoordinatorError::invalid("Child name cannot be empty"));
        }
        if name.len() > 100 {
            return Err(CoordinatorError::invalid(
                "Child name cannot exceed 100 characters",
            ));
        }

        let date_of_birth = NaiveDate::parse_from_str(&command.date_of_birth, "%Y-%m-%d")
            .map_err(|_| CoordinatorError::invalid("Invalid date of birth. Use YYYY-MM-DD."))?;
        let today = Utc::now().date_naive();
        if date_of_birth >= today {
            return Err(CoordinatorError::invalid("Date of birth must be in the past"));
        }

        let gender = command
            .gender
            .parse::<Gender>()
            .map_err(|_| CoordinatorError::invalid("Gender must be 'male' or 'female'"))?;

        let learning_difficulty = command.learning_difficulty.trim().to_string();
        if learning_difficulty.is_empty() {
            return Err(CoordinatorError::invalid(
                "Learning difficulty note cannot be empty",
            ));
        }

        let now = Utc::now();
        let child = Child {
            id: Child::generate_id(),
            name,
            date_of_birth,
            gender,
            learning_difficulty,
            created_at: now,
        };

        self.children
            .store_child(&child)
            .await
            .context("Failed to store child")?;

        info!("Created child: {} with ID: {}", child.name, child.id);
        Ok(child)
    }

    /// Get a child by ID
    pub async fn get_child(&self, child_id: &str) -> Result<Child, CoordinatorError> {
        self.children
            .get_child(child_id)
            .await?
            .ok_or_else(|| CoordinatorError::ChildNotFound(child_id.to_string()))
    }

    /// List all children ordered by name
    pub async fn list_children(&self) -> Result<Vec<Child>, CoordinatorError> {
        let children = self.children.list_children().await?;
        info!("Found {} children", children.len());
        Ok(children)
    }

    /// Delete a child. Cascades to the child's sessions and attempt history.
    pub async fn delete_child(&self, child_id: &str) -> Result<(), CoordinatorError> {
        let deleted = self.children.delete_child(child_id).await?;
        if !deleted {
            warn!("Child not found for deletion: {}", child_id);
            return Err(CoordinatorError::ChildNotFound(child_id.to_string()));
        }

        info!("Deleted child: {}", child_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test() -> ChildService {
        let db = DbConnection::init_test().await.expect("test db");
        ChildService::new(db)
    }

    fn create_command(name: &str) -> CreateChildCommand {
        CreateChildCommand {
            name: name.to_string(),
            date_of_birth: "2016-05-20".to_string(),
            gender: "female".to_string(),
            learning_difficulty: "speech delay".to_string(),
        }
    }

    #[tokio::test]
    async fn create_child_trims_and_stores() {
        let service = setup_test().await;

        let child = service
            .create_child(create_command("  Test Child "))
            .await
            .expect("create");
        assert_eq!(child.name, "Test Child");
        assert_eq!(child.date_of_birth.to_string(), "2016-05-20");
        assert_eq!(child.gender, Gender::Female);
    }

    #[tokio::test]
    async fn create_child_validation() {
        let service = setup_test().await;

        let empty_name = CreateChildCommand {
            name: " ".to_string(),
            ..create_command("x")
        };
        assert!(service.create_child(empty_name).await.is_err());

        let long_name = create_command(&"a".repeat(101));
        assert!(service.create_child(long_name).await.is_err());

        let bad_date = CreateChildCommand {
            date_of_birth: "2016/05/20".to_string(),
            ..create_command("Bad Date")
        };
        assert!(service.create_child(bad_date).await.is_err());

        let future_date = CreateChildCommand {
            date_of_birth: "2100-01-01".to_string(),
            ..create_command("Future")
        };
        assert!(service.create_child(future_date).await.is_err());

        let bad_gender = CreateChildCommand {
            gender: "unknown".to_string(),
            ..create_command("Bad Gender")
        };
        assert!(service.create_child(bad_gender).await.is_err());
    }

    #[tokio::test]
    async fn get_and_list_children() {
        let service = setup_test().await;
        let created = service.create_child(create_command("Alice")).await.unwrap();
        service.create_child(create_command("Bob")).await.unwrap();

        let fetched = service.get_child(&created.id).await.expect("get");
        assert_eq!(fetched.name, "Alice");

        let children = service.list_children().await.expect("list");
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].name, "Alice");
    }

    #[tokio::test]
    async fn get_nonexistent_child_is_an_error() {
        let service = setup_test().await;
        let result = service.get_child("non-existent-id").await;
        assert!(matches!(result, Err(CoordinatorError::ChildNotFound(_))));
    }

    #[tokio::test]
    async fn delete_child() {
        let service = setup_test().await;
        let created = service.create_child(create_command("To Delete")).await.unwrap();

        service.delete_child(&created.id).await.expect("delete");
        assert!(service.get_child(&created.id).await.is_err());

        let again = service.delete_child(&created.id).await;
        assert!(matches!(again, Err(CoordinatorError::ChildNotFound(_))));
    }
}
