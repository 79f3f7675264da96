//! User document model.

use serde::{Deserialize, Serialize};

/// A GitLab user as stored in the users index.
///
/// Two users are equal only when every field matches, which is what the
/// change detector relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// GitLab user ID (primary key of the users index).
    pub id: i64,

    pub username: String,

    /// Display name.
    pub name: String,

    /// Lifecycle state, e.g. `active` or `blocked`.
    #[serde(default)]
    pub state: String,

    #[serde(default)]
    pub avatar_url: String,

    /// Profile URL.
    #[serde(default)]
    pub web_url: String,
}

/// Deduplicate users by ID, keeping the first occurrence of each.
pub fn dedup_users(users: impl IntoIterator<Item = User>) -> Vec<User> {
    let mut seen = std::collections::HashSet::new();
    users
        .into_iter()
        .filter(|user| seen.insert(user.id))
        .collect()
}
