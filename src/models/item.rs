//! Unified item model for issues, merge requests and epics.

use super::user::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a GitLab item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Issue,
    MergeRequest,
    Epic,
}

impl ItemKind {
    /// Prefix that makes document IDs unique across kinds.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Issue => "i",
            Self::MergeRequest => "mr",
            Self::Epic => "e",
        }
    }

    /// Reference separator GitLab uses between the namespace path and the IID.
    pub fn separator(self) -> char {
        match self {
            Self::Issue => '#',
            Self::MergeRequest => '!',
            Self::Epic => '&',
        }
    }

    /// Document ID for an upstream numeric ID of this kind.
    pub fn document_id(self, upstream_id: i64) -> String {
        format!("{}{}", self.prefix(), upstream_id)
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Issue => write!(f, "issue"),
            Self::MergeRequest => write!(f, "merge_request"),
            Self::Epic => write!(f, "epic"),
        }
    }
}

/// Lifecycle state of an item. Epics never reach `Merged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Opened,
    Closed,
    Locked,
    Merged,
}

impl From<&str> for ItemState {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "closed" => Self::Closed,
            "locked" => Self::Locked,
            "merged" => Self::Merged,
            _ => Self::Opened,
        }
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opened => write!(f, "opened"),
            Self::Closed => write!(f, "closed"),
            Self::Locked => write!(f, "locked"),
            Self::Merged => write!(f, "merged"),
        }
    }
}

/// A label attached to an item.
///
/// When GitLab only reports label names, every field except `name` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub text_color: String,
}

impl Label {
    /// Label that only carries a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// An issue, merge request or epic as stored in the items index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Kind prefix followed by the GitLab ID, e.g. `i42` or `mr7`.
    pub id: String,

    /// ID of the configured group the item was synced for.
    pub group_id: i64,

    pub kind: ItemKind,

    pub web_url: String,

    /// Human-readable reference, e.g. `group/project#12` or `&8`.
    pub slug: String,

    #[serde(default)]
    pub labels: Vec<Label>,

    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Author first, then assignees; unique by user ID.
    #[serde(default)]
    pub involved_users: Vec<User>,

    /// Project- or group-scoped sequence number.
    pub iid: i64,

    pub state: ItemState,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub closed_at: Option<DateTime<Utc>>,
}
