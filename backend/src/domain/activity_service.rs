use anyhow::Context;
use log::info;

use crate::db::DbConnection;
use crate::domain::models::activity::Activity;
use crate::domain::registry;
use crate::error::CoordinatorError;
use crate::storage::ActivityRepository;

/// Service for the static activity catalog
#[derive(Clone)]
pub struct ActivityService {
    activities: ActivityRepository,
}

impl ActivityService {
    pub fn new(db: DbConnection) -> Self {
        Self {
            activities: ActivityRepository::new(db),
        }
    }

    /// Seed the catalog from the registry. Called once at startup.
    pub async fn seed_catalog(&self) -> Result<(), CoordinatorError> {
        self.activities
            .seed_catalog()
            .await
            .context("Failed to seed the activity catalog")?;
        info!("Activity catalog seeded ({} activities)", registry::ACTIVITIES.len());
        Ok(())
    }

    /// List all catalog activities
    pub async fn list_activities(&self) -> Result<Vec<Activity>, CoordinatorError> {
        Ok(self.activities.list_activities().await?)
    }

    /// Get one activity by id
    pub async fn get_activity(&self, activity_id: i64) -> Result<Activity, CoordinatorError> {
        self.activities
            .get_activity(activity_id)
            .await?
            .ok_or(CoordinatorError::ActivityNotFound(activity_id))
    }
}
