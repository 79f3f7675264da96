//! Business logic services.
//!
//! This module contains the API clients for GitLab and Meilisearch, the sync
//! engine built on top of them (paginator, normalizer, change detector,
//! reconciler, scheduler) and the HTTP search API.
//!
//! The engine only talks to the outside world through the `GitLabSource`
//! and `SearchIndex` traits, so it can be tested against in-memory fakes.

pub mod change_detector;
pub mod gitlab_client;
pub mod index_settings;
pub mod meili_client;
pub mod normalizer;
pub mod notifier;
pub mod paginator;
pub mod reconciler;
pub mod scheduler;
pub mod search;
pub mod server;

pub use gitlab_client::{GitLabClient, GitLabSource};
pub use meili_client::{MeiliClient, SearchIndex};
pub use notifier::{ChangeNotifier, LogNotifier};
pub use reconciler::Reconciler;
pub use scheduler::{Scheduler, SchedulerConfig};
