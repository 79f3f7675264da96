//! Index declarations and settings reconciliation.
//!
//! Runs once at startup, before any sync cycle. Creates missing indexes and
//! brings the managed settings in line with the declarations, writing only
//! when something differs.

use crate::error::AppError;
use crate::services::meili_client::{IndexSettings, SearchIndex};
use log::info;
use std::collections::BTreeSet;

/// Name of the users index.
pub const USERS_INDEX: &str = "gitlab_users";

/// Name of the items index.
pub const ITEMS_INDEX: &str = "gitlab_items";

/// Ranking rules applied to every managed index, in priority order.
pub const RANKING_RULES: [&str; 6] = ["sort", "words", "typo", "proximity", "attribute", "exactness"];

/// Declared shape of an index.
#[derive(Debug, Clone, Copy)]
pub struct IndexDeclaration {
    pub uid: &'static str,
    pub primary_key: &'static str,
    /// In ranking-priority order.
    pub searchable: &'static [&'static str],
    pub filterable: Option<&'static [&'static str]>,
    pub sortable: Option<&'static [&'static str]>,
}

pub const USERS: IndexDeclaration = IndexDeclaration {
    uid: USERS_INDEX,
    primary_key: "id",
    searchable: &["name", "username", "id"],
    filterable: None,
    sortable: None,
};

pub const ITEMS: IndexDeclaration = IndexDeclaration {
    uid: ITEMS_INDEX,
    primary_key: "id",
    searchable: &["title", "slug", "iid", "description", "labels", "state"],
    filterable: Some(&["group_id", "kind", "updated_at"]),
    sortable: Some(&["updated_at"]),
};

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl IndexDeclaration {
    /// Settings this declaration wants live.
    pub fn desired_settings(&self) -> IndexSettings {
        IndexSettings {
            searchable_attributes: Some(owned(self.searchable)),
            filterable_attributes: self.filterable.map(owned),
            sortable_attributes: self.sortable.map(owned),
            ranking_rules: Some(owned(&RANKING_RULES)),
        }
    }
}

/// Fields of `desired` that differ from `current`, or `None` when in sync.
///
/// Searchable attributes and ranking rules are ordered. Filterable and
/// sortable attributes are sets, and the index reports them sorted.
pub fn settings_diff(desired: &IndexSettings, current: &IndexSettings) -> Option<IndexSettings> {
    fn ordered(desired: &Option<Vec<String>>, current: &Option<Vec<String>>) -> Option<Vec<String>> {
        desired.as_ref().filter(|d| Some(*d) != current.as_ref()).cloned()
    }

    fn unordered(desired: &Option<Vec<String>>, current: &Option<Vec<String>>) -> Option<Vec<String>> {
        let as_set = |list: &Vec<String>| list.iter().cloned().collect::<BTreeSet<_>>();
        desired
            .as_ref()
            .filter(|d| current.as_ref().map(as_set) != Some(as_set(*d)))
            .cloned()
    }

    let diff = IndexSettings {
        searchable_attributes: ordered(&desired.searchable_attributes, &current.searchable_attributes),
        filterable_attributes: unordered(&desired.filterable_attributes, &current.filterable_attributes),
        sortable_attributes: unordered(&desired.sortable_attributes, &current.sortable_attributes),
        ranking_rules: ordered(&desired.ranking_rules, &current.ranking_rules),
    };

    (diff != IndexSettings::default()).then_some(diff)
}

/// Make sure the index exists and carries the declared settings.
///
/// Returns `true` when a settings update was applied.
pub async fn ensure_index<I>(index: &I, declaration: &IndexDeclaration) -> Result<bool, AppError>
where
    I: SearchIndex + ?Sized,
{
    if index.get_index(declaration.uid).await?.is_none() {
        info!(
            "[index] Creating index {} (primary key {})",
            declaration.uid, declaration.primary_key
        );
        let task = index.create_index(declaration.uid, declaration.primary_key).await?;
        index.wait_for_task(&task).await?.ensure_succeeded()?;
    }

    let current = index.get_settings(declaration.uid).await?;
    let Some(update) = settings_diff(&declaration.desired_settings(), &current) else {
        info!("[index] Settings of {} are up to date", declaration.uid);
        return Ok(false);
    };

    info!("[index] Updating settings of {}: {:?}", declaration.uid, update);
    let task = index.update_settings(declaration.uid, &update).await?;
    index.wait_for_task(&task).await?.ensure_succeeded()?;
    Ok(true)
}

/// Reconcile every index the sync engine writes to.
pub async fn ensure_all<I>(index: &I) -> Result<(), AppError>
where
    I: SearchIndex + ?Sized,
{
    for declaration in [USERS, ITEMS] {
        ensure_index(index, &declaration).await?;
    }
    Ok(())
}
