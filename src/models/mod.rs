//! Data models for the application.
//!
//! These models are the documents stored in the search index and the
//! groups the sync engine fans out over. They are plain value snapshots,
//! recomputed from GitLab every sync cycle.

pub mod group;
pub mod item;
pub mod user;

// Re-exports for convenient access
pub use group::{Group, GroupCache};
pub use item::{Item, ItemKind, ItemState, Label};
pub use user::{dedup_users, User};
