//! Repositories over the SQLite connection.
//!
//! The write paths enforce the store invariants declared in the schema:
//! at most one session per (child, activity) via an atomic upsert, and
//! bounded per-choice attempt history assigned at save time.

pub mod activity_repository;
pub mod attempt_repository;
pub mod child_repository;
pub mod session_repository;

pub use activity_repository::ActivityRepository;
pub use attempt_repository::AttemptRepository;
pub use child_repository::ChildRepository;
pub use session_repository::SessionRepository;
