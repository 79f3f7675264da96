//! Conversion of raw GitLab records into index documents.
//!
//! Everything here is pure: no I/O, same input gives the same document.

use crate::models::{dedup_users, Item, ItemKind, ItemState, Label, User};
use crate::services::gitlab_client::{
    GitLabEpic, GitLabIssue, GitLabLabel, GitLabMergeRequest, GitLabUser,
};

/// A raw upstream record of any item kind.
#[derive(Debug, Clone)]
pub enum RawItem {
    Issue(GitLabIssue),
    MergeRequest(GitLabMergeRequest),
    Epic(GitLabEpic),
}

impl RawItem {
    /// Confidential issues are never mirrored.
    pub fn is_listed(&self) -> bool {
        !matches!(self, Self::Issue(issue) if issue.confidential)
    }
}

/// Normalize a raw record fetched for `group_id` into an index document.
pub fn normalize(raw: &RawItem, group_id: i64) -> Item {
    match raw {
        RawItem::Issue(issue) => Item {
            id: ItemKind::Issue.document_id(issue.id),
            group_id,
            kind: ItemKind::Issue,
            web_url: issue.web_url.clone(),
            slug: reference_slug(ItemKind::Issue, &issue.references.full, issue.iid),
            labels: convert_labels(&issue.labels),
            title: issue.title.clone(),
            description: issue.description.clone().unwrap_or_default(),
            involved_users: involved_users(issue.author.as_ref(), &issue.assignees),
            iid: issue.iid,
            state: ItemState::from(issue.state.as_str()),
            created_at: issue.created_at,
            updated_at: issue.updated_at,
            closed_at: issue.closed_at,
        },
        RawItem::MergeRequest(mr) => Item {
            id: ItemKind::MergeRequest.document_id(mr.id),
            group_id,
            kind: ItemKind::MergeRequest,
            web_url: mr.web_url.clone(),
            slug: reference_slug(ItemKind::MergeRequest, &mr.references.full, mr.iid),
            labels: convert_labels(&mr.labels),
            title: mr.title.clone(),
            description: mr.description.clone().unwrap_or_default(),
            involved_users: involved_users(mr.author.as_ref(), &mr.assignees),
            iid: mr.iid,
            state: ItemState::from(mr.state.as_str()),
            created_at: mr.created_at,
            updated_at: mr.updated_at,
            closed_at: mr.closed_at,
        },
        RawItem::Epic(epic) => Item {
            id: ItemKind::Epic.document_id(epic.id),
            group_id,
            kind: ItemKind::Epic,
            web_url: epic.web_url.clone(),
            slug: format!("{}{}", ItemKind::Epic.separator(), epic.iid),
            labels: convert_labels(&epic.labels),
            title: epic.title.clone(),
            description: epic.description.clone().unwrap_or_default(),
            involved_users: involved_users(epic.author.as_ref(), &[]),
            iid: epic.iid,
            state: ItemState::from(epic.state.as_str()),
            created_at: epic.created_at,
            updated_at: epic.updated_at,
            closed_at: epic.closed_at,
        },
    }
}

/// Author first, then assignees, unique by user ID.
pub fn involved_users(author: Option<&GitLabUser>, assignees: &[GitLabUser]) -> Vec<User> {
    dedup_users(author.into_iter().chain(assignees).map(User::from))
}

/// Detailed labels when GitLab sent any, otherwise name-only labels.
pub fn convert_labels(labels: &[GitLabLabel]) -> Vec<Label> {
    let detailed: Vec<Label> = labels
        .iter()
        .filter_map(|label| match label {
            GitLabLabel::Detailed(details) => Some(Label {
                id: details.id,
                name: details.name.clone(),
                color: details.color.clone(),
                description: details.description.clone().unwrap_or_default(),
                text_color: details.text_color.clone(),
            }),
            GitLabLabel::Name(_) => None,
        })
        .collect();

    if !detailed.is_empty() {
        return detailed;
    }

    labels
        .iter()
        .filter_map(|label| match label {
            GitLabLabel::Name(name) => Some(Label::named(name.clone())),
            GitLabLabel::Detailed(_) => None,
        })
        .collect()
}

/// Namespace part of the full reference, the kind separator, then the IID.
///
/// e.g. `group/proj#12` for issue 12, `group/proj!4` for merge request 4.
fn reference_slug(kind: ItemKind, full_reference: &str, iid: i64) -> String {
    let separator = kind.separator();
    let namespace = full_reference.split(separator).next().unwrap_or_default();
    format!("{}{}{}", namespace, separator, iid)
}
