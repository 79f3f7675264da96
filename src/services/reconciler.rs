//! Reconciles GitLab groups into the search index.
//!
//! One entry point per sync category:
//! - [`Reconciler::sync_users`] does a full scan of every group's members.
//! - [`Reconciler::sync_group_items`] does an incremental fetch of a group's
//!   issues, merge requests and epics, each bounded by the newest item of
//!   that kind already indexed for the group.
//!
//! Only documents the change detector flags are written. A batch is written
//! in one request and its task is awaited; anything but success fails the
//! call.

use crate::error::AppError;
use crate::models::{dedup_users, Group, GroupCache, ItemKind, User};
use crate::services::change_detector::{self, Document};
use crate::services::gitlab_client::{GitLabEpic, GitLabIssue, GitLabMergeRequest, GitLabSource};
use crate::services::index_settings::{ITEMS_INDEX, USERS_INDEX};
use crate::services::meili_client::{
    add_typed_documents, get_typed_document, search_typed, SearchIndex, SearchRequest,
};
use crate::services::normalizer::{normalize, RawItem};
use crate::services::notifier::ChangeNotifier;
use crate::services::paginator::Paginator;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Index lookups in flight at once while detecting changes.
const LOOKUP_CONCURRENCY: usize = 8;

/// A kind whose fetch failed during a group item sync.
#[derive(Debug)]
pub struct KindFailure {
    pub kind: ItemKind,
    pub error: AppError,
}

/// Outcome of a group item sync that reached the write step.
#[derive(Debug)]
pub struct GroupSyncResult {
    pub group_id: i64,

    /// Documents written, across all kinds that were fetched.
    pub written: usize,

    /// Kinds that failed to fetch. Their items may be stale.
    pub failures: Vec<KindFailure>,
}

impl GroupSyncResult {
    /// One error describing every failed kind, if any failed.
    pub fn combined_error(&self) -> Option<AppError> {
        if self.failures.is_empty() {
            return None;
        }

        let details: Vec<String> = self
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.kind, f.error))
            .collect();
        Some(AppError::sync(format!(
            "group {}: {}",
            self.group_id,
            details.join("; ")
        )))
    }
}

#[derive(Deserialize)]
struct UpdatedAt {
    updated_at: DateTime<Utc>,
}

/// Sync engine core, shared by the scheduler.
pub struct Reconciler {
    gitlab: Arc<dyn GitLabSource>,
    index: Arc<dyn SearchIndex>,
    groups: Arc<GroupCache>,
    notifier: Arc<dyn ChangeNotifier>,
}

impl Reconciler {
    pub fn new(
        gitlab: Arc<dyn GitLabSource>,
        index: Arc<dyn SearchIndex>,
        groups: Arc<GroupCache>,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Self {
        Self {
            gitlab,
            index,
            groups,
            notifier,
        }
    }

    pub fn groups(&self) -> &GroupCache {
        &self.groups
    }

    /// Mirror the members of every group.
    ///
    /// Users are deduplicated across groups, first group wins. A failed
    /// member fetch for any group fails the call before anything is written.
    pub async fn sync_users(&self) -> Result<usize, AppError> {
        let gitlab = self.gitlab.as_ref();
        let mut members = Vec::new();
        for group in self.groups.iter() {
            let group_id = group.id;
            let paginator = Paginator::new(move |page| gitlab.list_group_members(group_id, page));
            let page_members = paginator.collect_all().await.map_err(|e| {
                warn!("[sync] Failed to fetch members of group {}: {}", group.id, e);
                e
            })?;
            members.extend(page_members.iter().map(User::from));
        }

        let users = dedup_users(members);
        let fetched = users.len();
        let changed = self.changed_documents(USERS_INDEX, users).await;
        debug!("[sync] {} of {} user(s) need a write", changed.len(), fetched);

        self.write_batch(USERS_INDEX, &changed).await?;
        if !changed.is_empty() {
            self.notifier.users_changed(&changed);
        }

        Ok(changed.len())
    }

    /// Mirror a group's issues, merge requests and epics.
    ///
    /// The three kinds are fetched concurrently. A failed kind does not stop
    /// the others; it is reported in [`GroupSyncResult::failures`] while the
    /// items of the other kinds are still written. A failed write or a
    /// non-successful index task is an error.
    pub async fn sync_group_items(&self, group: &Group) -> Result<GroupSyncResult, AppError> {
        let (issues_after, mrs_after, epics_after) = futures::join!(
            self.cutoff(group.id, ItemKind::Issue),
            self.cutoff(group.id, ItemKind::MergeRequest),
            self.cutoff(group.id, ItemKind::Epic),
        );

        let gitlab = self.gitlab.as_ref();
        let group_id = group.id;
        let issues = Paginator::new(move |page| gitlab.list_group_issues(group_id, page, issues_after))
            .with_cutoff(issues_after, |issue: &GitLabIssue| issue.updated_at);
        let merge_requests =
            Paginator::new(move |page| gitlab.list_group_merge_requests(group_id, page, mrs_after))
                .with_cutoff(mrs_after, |mr: &GitLabMergeRequest| mr.updated_at);
        let epics = Paginator::new(move |page| gitlab.list_group_epics(group_id, page, epics_after))
            .with_cutoff(epics_after, |epic: &GitLabEpic| epic.updated_at);

        let streams: Vec<BoxStream<'_, (ItemKind, Result<RawItem, AppError>)>> = vec![
            issues
                .stream()
                .map_ok(RawItem::Issue)
                .map(|next| (ItemKind::Issue, next))
                .boxed(),
            merge_requests
                .stream()
                .map_ok(RawItem::MergeRequest)
                .map(|next| (ItemKind::MergeRequest, next))
                .boxed(),
            epics
                .stream()
                .map_ok(RawItem::Epic)
                .map(|next| (ItemKind::Epic, next))
                .boxed(),
        ];

        // Arrival order; no ordering across kinds
        let mut merged = stream::select_all(streams);
        let mut seen = HashSet::new();
        let mut fresh = Vec::new();
        let mut failures = Vec::new();
        while let Some((kind, next)) = merged.next().await {
            match next {
                Ok(raw) if !raw.is_listed() => {}
                Ok(raw) => {
                    let item = normalize(&raw, group.id);
                    // an item edited mid-walk can show up on two pages
                    if seen.insert(item.id.clone()) {
                        fresh.push(item);
                    }
                }
                Err(error) => {
                    warn!(
                        "[sync] Failed to fetch {} items of group {}: {}",
                        kind, group.id, error
                    );
                    failures.push(KindFailure { kind, error });
                }
            }
        }

        let fetched = fresh.len();
        let changed = self.changed_documents(ITEMS_INDEX, fresh).await;
        debug!(
            "[sync] Group {}: {} of {} item(s) need a write",
            group.id,
            changed.len(),
            fetched
        );

        self.write_batch(ITEMS_INDEX, &changed).await?;
        if !changed.is_empty() {
            self.notifier.items_changed(&changed);
        }

        Ok(GroupSyncResult {
            group_id: group.id,
            written: changed.len(),
            failures,
        })
    }

    /// `updated_at` of the newest indexed item of `kind` in the group.
    pub async fn newest_indexed(
        &self,
        group_id: i64,
        kind: ItemKind,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let request = SearchRequest {
            q: String::new(),
            limit: Some(1),
            filter: Some(vec![
                format!("group_id = {}", group_id),
                format!("kind = \"{}\"", kind),
            ]),
            sort: Some(vec!["updated_at:desc".to_string()]),
            attributes_to_retrieve: Some(vec!["updated_at".to_string()]),
        };

        let hits: Vec<UpdatedAt> = search_typed(self.index.as_ref(), ITEMS_INDEX, &request).await?;
        Ok(hits.into_iter().next().map(|hit| hit.updated_at))
    }

    async fn cutoff(&self, group_id: i64, kind: ItemKind) -> Option<DateTime<Utc>> {
        match self.newest_indexed(group_id, kind).await {
            Ok(cutoff) => cutoff,
            Err(e) => {
                warn!(
                    "[sync] Could not find newest indexed {} of group {}, fetching all: {}",
                    kind, group_id, e
                );
                None
            }
        }
    }

    /// Documents that are missing from the index or differ from it, in input order.
    ///
    /// A failed lookup counts as missing.
    async fn changed_documents<T>(&self, uid: &str, fresh: Vec<T>) -> Vec<T>
    where
        T: Document + PartialEq + DeserializeOwned + Send,
    {
        let index = self.index.as_ref();
        let pairs: Vec<(T, Option<T>)> = stream::iter(fresh)
            .map(|doc| async move {
                let id = doc.document_id();
                let indexed = match get_typed_document::<T, _>(index, uid, &id).await {
                    Ok(found) => found,
                    Err(e) => {
                        debug!("[sync] Lookup of {} in {} failed: {}", id, uid, e);
                        None
                    }
                };
                (doc, indexed)
            })
            .buffered(LOOKUP_CONCURRENCY)
            .collect()
            .await;

        change_detector::changed(pairs)
    }

    /// Write a batch and wait for the index to confirm it.
    async fn write_batch<T: Serialize>(&self, uid: &str, documents: &[T]) -> Result<(), AppError> {
        if documents.is_empty() {
            return Ok(());
        }

        let task = add_typed_documents(self.index.as_ref(), uid, documents).await?;
        let task = self.index.wait_for_task(&task).await?.ensure_succeeded()?;
        info!(
            "[index] Wrote {} document(s) to {} (task {})",
            documents.len(),
            uid,
            task.uid
        );
        Ok(())
    }
}

/// Sum of a set of group results, for cycle logging.
pub fn total_written(results: &[GroupSyncResult]) -> usize {
    results.iter().map(|r| r.written).sum()
}
