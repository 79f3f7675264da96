//! In-memory fakes of GitLab and Meilisearch for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use gitlab_search_sync::error::AppError;
use gitlab_search_sync::models::{Group, GroupCache, Item, User};
use gitlab_search_sync::services::gitlab_client::{
    GitLabEpic, GitLabGroup, GitLabIssue, GitLabLabel, GitLabMergeRequest, GitLabReferences,
    GitLabSource, GitLabUser, PaginatedResponse, PaginationInfo,
};
use gitlab_search_sync::services::meili_client::{
    IndexInfo, IndexSettings, SearchIndex, SearchRequest, SearchResponse, Task, TaskError,
    TaskInfo, TaskStatus,
};
use gitlab_search_sync::services::notifier::ChangeNotifier;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// ── Builders ─────────────────────────────────────────────────────────────────

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn at(offset_minutes: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(offset_minutes)
}

pub fn gl_user(id: i64, username: &str) -> GitLabUser {
    GitLabUser {
        id,
        username: username.to_string(),
        name: format!("{} Name", username),
        state: Some("active".to_string()),
        avatar_url: None,
        web_url: Some(format!("https://gitlab.example.com/{}", username)),
    }
}

pub fn gl_group(id: i64, path: &str) -> GitLabGroup {
    GitLabGroup {
        id,
        name: path.to_string(),
        full_path: path.to_string(),
        web_url: format!("https://gitlab.example.com/groups/{}", path),
    }
}

pub fn group(id: i64, path: &str) -> Group {
    gl_group(id, path).into()
}

pub fn issue(id: i64, iid: i64, updated_minutes: i64) -> GitLabIssue {
    GitLabIssue {
        id,
        iid,
        title: format!("Issue {}", iid),
        description: Some("Something is broken".to_string()),
        state: "opened".to_string(),
        web_url: format!("https://gitlab.example.com/acme/app/-/issues/{}", iid),
        created_at: at(-1000),
        updated_at: at(updated_minutes),
        closed_at: None,
        author: Some(gl_user(1, "ada")),
        assignees: vec![gl_user(2, "grace")],
        labels: vec![GitLabLabel::Name("bug".to_string())],
        references: GitLabReferences {
            full: format!("acme/app#{}", iid),
        },
        confidential: false,
    }
}

pub fn merge_request(id: i64, iid: i64, updated_minutes: i64) -> GitLabMergeRequest {
    GitLabMergeRequest {
        id,
        iid,
        title: format!("Merge request {}", iid),
        description: None,
        state: "opened".to_string(),
        web_url: format!("https://gitlab.example.com/acme/app/-/merge_requests/{}", iid),
        created_at: at(-1000),
        updated_at: at(updated_minutes),
        closed_at: None,
        author: Some(gl_user(2, "grace")),
        assignees: Vec::new(),
        labels: Vec::new(),
        references: GitLabReferences {
            full: format!("acme/app!{}", iid),
        },
    }
}

pub fn epic(id: i64, iid: i64, updated_minutes: i64) -> GitLabEpic {
    GitLabEpic {
        id,
        iid,
        group_id: 10,
        title: format!("Epic {}", iid),
        description: None,
        state: "opened".to_string(),
        web_url: format!("https://gitlab.example.com/groups/acme/-/epics/{}", iid),
        created_at: at(-1000),
        updated_at: at(updated_minutes),
        closed_at: None,
        author: Some(gl_user(1, "ada")),
        labels: Vec::new(),
    }
}

// ── GitLab ───────────────────────────────────────────────────────────────────

/// Upstream records per group, served newest-updated first.
#[derive(Default)]
struct GroupData {
    members: Vec<GitLabUser>,
    issues: Vec<GitLabIssue>,
    merge_requests: Vec<GitLabMergeRequest>,
    epics: Vec<GitLabEpic>,
}

/// Fake GitLab that serves canned records in small pages.
pub struct FakeGitLab {
    per_page: usize,
    groups: Mutex<HashMap<i64, GitLabGroup>>,
    data: Mutex<HashMap<i64, GroupData>>,
    failing: Mutex<HashSet<(i64, &'static str)>>,
    held: Mutex<HashMap<(i64, &'static str), Arc<Notify>>>,
    requests: Mutex<Vec<String>>,
}

impl FakeGitLab {
    pub fn new(per_page: usize) -> Self {
        Self {
            per_page,
            groups: Mutex::new(HashMap::new()),
            data: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            held: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn add_group(&self, group: GitLabGroup) {
        self.data.lock().unwrap().entry(group.id).or_default();
        self.groups.lock().unwrap().insert(group.id, group);
    }

    pub fn set_members(&self, group_id: i64, members: Vec<GitLabUser>) {
        self.data.lock().unwrap().entry(group_id).or_default().members = members;
    }

    pub fn set_issues(&self, group_id: i64, mut issues: Vec<GitLabIssue>) {
        issues.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        self.data.lock().unwrap().entry(group_id).or_default().issues = issues;
    }

    pub fn set_merge_requests(&self, group_id: i64, mut mrs: Vec<GitLabMergeRequest>) {
        mrs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        self.data.lock().unwrap().entry(group_id).or_default().merge_requests = mrs;
    }

    pub fn set_epics(&self, group_id: i64, mut epics: Vec<GitLabEpic>) {
        epics.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        self.data.lock().unwrap().entry(group_id).or_default().epics = epics;
    }

    /// Make every request for `endpoint` of `group_id` fail.
    ///
    /// Endpoints: `members`, `issues`, `merge_requests`, `epics`.
    pub fn fail(&self, group_id: i64, endpoint: &'static str) {
        self.failing.lock().unwrap().insert((group_id, endpoint));
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Park the next request for `endpoint` of `group_id` until the returned
    /// handle is notified.
    pub fn hold(&self, group_id: i64, endpoint: &'static str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.held
            .lock()
            .unwrap()
            .insert((group_id, endpoint), gate.clone());
        gate
    }

    async fn wait_if_held(&self, group_id: i64, endpoint: &'static str) {
        let gate = self.held.lock().unwrap().remove(&(group_id, endpoint));
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    /// Requests made so far, as `endpoint:group:page`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    pub fn request_count(&self, endpoint: &str) -> usize {
        let prefix = format!("{}:", endpoint);
        self.requests().iter().filter(|r| r.starts_with(&prefix)).count()
    }

    fn record(&self, endpoint: &'static str, group_id: i64, page: u32) -> Result<(), AppError> {
        self.requests
            .lock()
            .unwrap()
            .push(format!("{}:{}:{}", endpoint, group_id, page));

        if self.failing.lock().unwrap().contains(&(group_id, endpoint)) {
            return Err(AppError::gitlab_api_full(
                "500 Internal Server Error",
                500,
                format!("/groups/{}/{}", group_id, endpoint),
            ));
        }
        Ok(())
    }

    fn page_of<T: Clone>(&self, records: Vec<T>, page: u32) -> PaginatedResponse<T> {
        let total = records.len();
        let total_pages = total.div_ceil(self.per_page).max(1) as u32;
        let start = (page as usize - 1) * self.per_page;
        let data: Vec<T> = records.into_iter().skip(start).take(self.per_page).collect();

        PaginatedResponse {
            data,
            pagination: PaginationInfo {
                page,
                per_page: self.per_page as u32,
                total_pages: Some(total_pages),
                total: Some(total as u32),
                next_page: (page < total_pages).then_some(page + 1),
            },
        }
    }
}

fn updated_since<T>(
    records: &[T],
    after: Option<DateTime<Utc>>,
    updated_at: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T>
where
    T: Clone,
{
    records
        .iter()
        .filter(|r| after.is_none_or(|after| updated_at(r) >= after))
        .cloned()
        .collect()
}

#[async_trait]
impl GitLabSource for FakeGitLab {
    async fn get_group(&self, group_id: i64) -> Result<GitLabGroup, AppError> {
        self.groups
            .lock()
            .unwrap()
            .get(&group_id)
            .cloned()
            .ok_or_else(|| AppError::gitlab_api_full("404 Group Not Found", 404, "/groups"))
    }

    async fn list_group_members(
        &self,
        group_id: i64,
        page: u32,
    ) -> Result<PaginatedResponse<GitLabUser>, AppError> {
        self.record("members", group_id, page)?;
        let members = self
            .data
            .lock()
            .unwrap()
            .get(&group_id)
            .map(|d| d.members.clone())
            .unwrap_or_default();
        Ok(self.page_of(members, page))
    }

    async fn list_group_issues(
        &self,
        group_id: i64,
        page: u32,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<PaginatedResponse<GitLabIssue>, AppError> {
        self.record("issues", group_id, page)?;
        self.wait_if_held(group_id, "issues").await;
        let issues = self
            .data
            .lock()
            .unwrap()
            .get(&group_id)
            .map(|d| updated_since(&d.issues, updated_after, |i| i.updated_at))
            .unwrap_or_default();
        Ok(self.page_of(issues, page))
    }

    async fn list_group_merge_requests(
        &self,
        group_id: i64,
        page: u32,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<PaginatedResponse<GitLabMergeRequest>, AppError> {
        self.record("merge_requests", group_id, page)?;
        self.wait_if_held(group_id, "merge_requests").await;
        let mrs = self
            .data
            .lock()
            .unwrap()
            .get(&group_id)
            .map(|d| updated_since(&d.merge_requests, updated_after, |m| m.updated_at))
            .unwrap_or_default();
        Ok(self.page_of(mrs, page))
    }

    async fn list_group_epics(
        &self,
        group_id: i64,
        page: u32,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<PaginatedResponse<GitLabEpic>, AppError> {
        self.record("epics", group_id, page)?;
        self.wait_if_held(group_id, "epics").await;
        let epics = self
            .data
            .lock()
            .unwrap()
            .get(&group_id)
            .map(|d| updated_since(&d.epics, updated_after, |e| e.updated_at))
            .unwrap_or_default();
        Ok(self.page_of(epics, page))
    }
}

// ── Meilisearch ──────────────────────────────────────────────────────────────

struct FakeIndexState {
    primary_key: String,
    settings: IndexSettings,
    documents: BTreeMap<String, Value>,
}

/// Fake Meilisearch that applies writes immediately.
#[derive(Default)]
pub struct FakeIndex {
    indexes: Mutex<HashMap<String, FakeIndexState>>,
    tasks: Mutex<HashMap<u64, Task>>,
    next_task: AtomicU64,
    fail_next_write: Mutex<Option<String>>,
    lookups_fail: Mutex<bool>,
    pub create_calls: AtomicUsize,
    pub settings_updates: AtomicUsize,
    pub document_writes: AtomicUsize,
}

fn primary_key_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn matches_filter(doc: &Value, filter: &str) -> bool {
    let Some((field, expected)) = filter.split_once(" = ") else {
        return true;
    };
    let expected = expected.trim_matches('"');
    doc.get(field.trim())
        .and_then(primary_key_value)
        .is_some_and(|actual| actual == expected)
}

fn matches_query(doc: &Value, q: &str) -> bool {
    if q.is_empty() {
        return true;
    }
    let q = q.to_lowercase();
    match doc {
        Value::Object(map) => map.values().any(|v| matches_query(v, &q)),
        Value::Array(values) => values.iter().any(|v| matches_query(v, &q)),
        Value::String(s) => s.to_lowercase().contains(&q),
        Value::Number(n) => n.to_string() == q,
        _ => false,
    }
}

fn updated_at_of(doc: &Value) -> Option<DateTime<Utc>> {
    doc.get("updated_at")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

impl FakeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the task of the next document write end as `failed`.
    pub fn fail_next_write(&self, message: &str) {
        *self.fail_next_write.lock().unwrap() = Some(message.to_string());
    }

    /// Make every document lookup fail.
    pub fn fail_lookups(&self, fail: bool) {
        *self.lookups_fail.lock().unwrap() = fail;
    }

    pub fn document_count(&self, uid: &str) -> usize {
        self.indexes
            .lock()
            .unwrap()
            .get(uid)
            .map(|i| i.documents.len())
            .unwrap_or(0)
    }

    pub fn document(&self, uid: &str, id: &str) -> Option<Value> {
        self.indexes
            .lock()
            .unwrap()
            .get(uid)
            .and_then(|i| i.documents.get(id).cloned())
    }

    pub fn settings(&self, uid: &str) -> Option<IndexSettings> {
        self.indexes
            .lock()
            .unwrap()
            .get(uid)
            .map(|i| i.settings.clone())
    }

    pub fn writes(&self) -> usize {
        self.document_writes.load(Ordering::SeqCst)
    }

    fn enqueue(&self, uid: &str, task_type: &str, error: Option<String>) -> TaskInfo {
        let task_uid = self.next_task.fetch_add(1, Ordering::SeqCst);
        let status = if error.is_some() {
            TaskStatus::Failed
        } else {
            TaskStatus::Succeeded
        };
        self.tasks.lock().unwrap().insert(
            task_uid,
            Task {
                uid: task_uid,
                status,
                task_type: task_type.to_string(),
                error: error.map(|message| TaskError {
                    message,
                    code: "internal".to_string(),
                }),
            },
        );

        TaskInfo {
            task_uid,
            index_uid: Some(uid.to_string()),
            status: TaskStatus::Enqueued,
        }
    }

    fn missing(uid: &str) -> AppError {
        AppError::index_api_full(
            format!("Index `{}` not found.", uid),
            404,
            Some("index_not_found".to_string()),
        )
    }
}

#[async_trait]
impl SearchIndex for FakeIndex {
    async fn get_index(&self, uid: &str) -> Result<Option<IndexInfo>, AppError> {
        Ok(self.indexes.lock().unwrap().get(uid).map(|i| IndexInfo {
            uid: uid.to_string(),
            primary_key: Some(i.primary_key.clone()),
        }))
    }

    async fn create_index(&self, uid: &str, primary_key: &str) -> Result<TaskInfo, AppError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.indexes.lock().unwrap().insert(
            uid.to_string(),
            FakeIndexState {
                primary_key: primary_key.to_string(),
                settings: IndexSettings {
                    searchable_attributes: Some(vec!["*".to_string()]),
                    filterable_attributes: Some(Vec::new()),
                    sortable_attributes: Some(Vec::new()),
                    ranking_rules: Some(
                        ["words", "typo", "proximity", "attribute", "sort", "exactness"]
                            .iter()
                            .map(|s| s.to_string())
                            .collect(),
                    ),
                },
                documents: BTreeMap::new(),
            },
        );
        Ok(self.enqueue(uid, "indexCreation", None))
    }

    async fn get_settings(&self, uid: &str) -> Result<IndexSettings, AppError> {
        self.settings(uid).ok_or_else(|| Self::missing(uid))
    }

    async fn update_settings(
        &self,
        uid: &str,
        settings: &IndexSettings,
    ) -> Result<TaskInfo, AppError> {
        self.settings_updates.fetch_add(1, Ordering::SeqCst);
        {
            let mut indexes = self.indexes.lock().unwrap();
            let index = indexes.get_mut(uid).ok_or_else(|| Self::missing(uid))?;
            let live = &mut index.settings;
            if let Some(v) = &settings.searchable_attributes {
                live.searchable_attributes = Some(v.clone());
            }
            // Meilisearch reports set-like settings sorted
            if let Some(v) = &settings.filterable_attributes {
                let mut sorted = v.clone();
                sorted.sort();
                live.filterable_attributes = Some(sorted);
            }
            if let Some(v) = &settings.sortable_attributes {
                let mut sorted = v.clone();
                sorted.sort();
                live.sortable_attributes = Some(sorted);
            }
            if let Some(v) = &settings.ranking_rules {
                live.ranking_rules = Some(v.clone());
            }
        }
        Ok(self.enqueue(uid, "settingsUpdate", None))
    }

    async fn wait_for_task(&self, task: &TaskInfo) -> Result<Task, AppError> {
        self.tasks
            .lock()
            .unwrap()
            .get(&task.task_uid)
            .cloned()
            .ok_or_else(|| AppError::index_api(format!("Task {} not found", task.task_uid)))
    }

    async fn get_document(&self, uid: &str, id: &str) -> Result<Option<Value>, AppError> {
        if *self.lookups_fail.lock().unwrap() {
            return Err(AppError::index_api("connection refused"));
        }
        Ok(self.document(uid, id))
    }

    async fn add_documents(&self, uid: &str, documents: &[Value]) -> Result<TaskInfo, AppError> {
        self.document_writes.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self.fail_next_write.lock().unwrap().take() {
            return Ok(self.enqueue(uid, "documentAdditionOrUpdate", Some(message)));
        }

        {
            let mut indexes = self.indexes.lock().unwrap();
            let index = indexes.get_mut(uid).ok_or_else(|| Self::missing(uid))?;
            for doc in documents {
                let id = doc
                    .get(&index.primary_key)
                    .and_then(primary_key_value)
                    .ok_or_else(|| AppError::index_api("document without primary key"))?;
                index.documents.insert(id, doc.clone());
            }
        }
        Ok(self.enqueue(uid, "documentAdditionOrUpdate", None))
    }

    async fn search(
        &self,
        uid: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse, AppError> {
        let indexes = self.indexes.lock().unwrap();
        let index = indexes.get(uid).ok_or_else(|| Self::missing(uid))?;

        let filters = request.filter.clone().unwrap_or_default();
        let mut hits: Vec<Value> = index
            .documents
            .values()
            .filter(|doc| filters.iter().all(|f| matches_filter(doc, f)))
            .filter(|doc| matches_query(doc, &request.q))
            .cloned()
            .collect();

        if request
            .sort
            .as_ref()
            .is_some_and(|s| s.iter().any(|s| s == "updated_at:desc"))
        {
            hits.sort_by_key(|doc| std::cmp::Reverse(updated_at_of(doc)));
        }
        let total = hits.len() as u64;
        hits.truncate(request.limit.unwrap_or(20));

        if let Some(attributes) = &request.attributes_to_retrieve {
            if !attributes.iter().any(|a| a == "*") {
                for hit in &mut hits {
                    if let Value::Object(map) = hit {
                        map.retain(|key, _| attributes.contains(key));
                    }
                }
            }
        }

        Ok(SearchResponse {
            hits,
            estimated_total_hits: Some(total),
        })
    }
}

// ── Notifier ─────────────────────────────────────────────────────────────────

/// Records every notification it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    pub users: Mutex<Vec<Vec<User>>>,
    pub items: Mutex<Vec<Vec<Item>>>,
}

impl RecordingNotifier {
    pub fn user_batches(&self) -> Vec<Vec<User>> {
        self.users.lock().unwrap().clone()
    }

    pub fn item_batches(&self) -> Vec<Vec<Item>> {
        self.items.lock().unwrap().clone()
    }
}

impl ChangeNotifier for RecordingNotifier {
    fn users_changed(&self, users: &[User]) {
        self.users.lock().unwrap().push(users.to_vec());
    }

    fn items_changed(&self, items: &[Item]) {
        self.items.lock().unwrap().push(items.to_vec());
    }
}

pub fn cache(groups: &[Group]) -> GroupCache {
    GroupCache::new(groups.iter().cloned())
}
