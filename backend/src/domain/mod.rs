pub mod activity_service;
pub mod child_service;
pub mod models;
pub mod reconciler;
pub mod registry;
pub mod session_service;
