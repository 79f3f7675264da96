//! Configured GitLab groups.

use serde::{Deserialize, Serialize};

/// A GitLab group whose members and items are mirrored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    /// Namespace path, e.g. `acme/platform`.
    #[serde(default)]
    pub full_path: String,
    #[serde(default)]
    pub web_url: String,
}

/// Groups loaded once at startup, in configuration order.
///
/// Read-only after construction; shared behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct GroupCache {
    groups: Vec<Group>,
}

impl GroupCache {
    /// Build a cache from already-fetched groups. Duplicate IDs keep the first entry.
    pub fn new(groups: impl IntoIterator<Item = Group>) -> Self {
        let mut unique: Vec<Group> = Vec::new();
        for group in groups {
            if !unique.iter().any(|g| g.id == group.id) {
                unique.push(group);
            }
        }
        Self { groups: unique }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
