//! Meilisearch API client.
//!
//! Provides HTTP client for the Meilisearch REST API with bearer-key
//! authentication and task polling, plus the [`SearchIndex`] trait the sync
//! engine writes through. Documents cross the trait as JSON values so the
//! trait stays object-safe; the typed helpers at the bottom (de)serialize
//! them.

use crate::error::AppError;
use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

/// Meilisearch client configuration.
#[derive(Debug, Clone)]
pub struct MeiliClientConfig {
    /// Base URL of the Meilisearch instance (e.g., `http://localhost:7700`).
    pub host: String,

    /// Master or API key.
    pub api_key: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Delay between task status polls in milliseconds.
    pub task_poll_interval_ms: u64,

    /// Give up waiting for a task after this many seconds.
    pub task_timeout_secs: u64,
}

impl Default for MeiliClientConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            api_key: String::new(),
            timeout_secs: 60,
            task_poll_interval_ms: 50,
            task_timeout_secs: 300,
        }
    }
}

/// Meilisearch API client.
#[derive(Debug, Clone)]
pub struct MeiliClient {
    client: Client,
    config: MeiliClientConfig,
}

/// Index metadata from `GET /indexes/:uid`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    pub uid: String,
    pub primary_key: Option<String>,
}

/// Lifecycle status of an asynchronous task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    Enqueued,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enqueued => write!(f, "enqueued"),
            Self::Processing => write!(f, "processing"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// Summary returned when a write is accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub task_uid: u64,
    pub index_uid: Option<String>,
    pub status: TaskStatus,
}

/// Error details of a failed task.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskError {
    pub message: String,
    #[serde(default)]
    pub code: String,
}

/// Full task from `GET /tasks/:uid`.
#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    pub uid: u64,
    pub status: TaskStatus,
    #[serde(rename = "type", default)]
    pub task_type: String,
    pub error: Option<TaskError>,
}

impl Task {
    /// Turn anything but `succeeded` into an [`AppError::IndexTask`].
    pub fn ensure_succeeded(self) -> Result<Task, AppError> {
        if self.status == TaskStatus::Succeeded {
            return Ok(self);
        }

        let message = self
            .error
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| format!("{} task did not succeed", self.task_type));
        Err(AppError::index_task(self.uid, self.status.to_string(), message))
    }
}

/// The settings this service manages. Unset fields are left untouched on update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub searchable_attributes: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filterable_attributes: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sortable_attributes: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranking_rules: Option<Vec<String>>,
}

/// Body of `POST /indexes/:uid/search`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub q: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Filter expressions, combined with AND.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<String>>,

    /// Sort expressions, e.g. `updated_at:desc`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes_to_retrieve: Option<Vec<String>>,
}

/// Search response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub hits: Vec<Value>,

    pub estimated_total_hits: Option<u64>,
}

/// Meilisearch error body.
#[derive(Debug, Deserialize)]
struct MeiliErrorBody {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// Search index operations the sync engine depends on.
///
/// Implementations must be safe to share between concurrent fetch tasks.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Get index metadata, `None` when the index does not exist.
    async fn get_index(&self, uid: &str) -> Result<Option<IndexInfo>, AppError>;

    /// Create an index with the given primary key.
    async fn create_index(&self, uid: &str, primary_key: &str) -> Result<TaskInfo, AppError>;

    /// Read the live settings of an index.
    async fn get_settings(&self, uid: &str) -> Result<IndexSettings, AppError>;

    /// Submit a settings update.
    async fn update_settings(
        &self,
        uid: &str,
        settings: &IndexSettings,
    ) -> Result<TaskInfo, AppError>;

    /// Wait until a task reaches a terminal status.
    async fn wait_for_task(&self, task: &TaskInfo) -> Result<Task, AppError>;

    /// Get a document by primary key, `None` when it does not exist.
    async fn get_document(&self, uid: &str, id: &str) -> Result<Option<Value>, AppError>;

    /// Add or replace a batch of documents.
    async fn add_documents(&self, uid: &str, documents: &[Value]) -> Result<TaskInfo, AppError>;

    /// Run a search query.
    async fn search(&self, uid: &str, request: &SearchRequest)
        -> Result<SearchResponse, AppError>;
}

impl MeiliClient {
    /// Create a new Meilisearch client.
    pub fn new(config: MeiliClientConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();

        let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| AppError::invalid_input_field("Invalid API key format", "MEILI_MASTER_KEY"))?;
        headers.insert(header::AUTHORIZATION, auth_value);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.host.trim_end_matches('/'), path)
    }

    fn transport_error(err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            AppError::index_api("Search index request timed out")
        } else {
            AppError::index_api(format!("Failed to reach search index: {}", err))
        }
    }

    /// Handle API response errors.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
        endpoint: &str,
    ) -> Result<T, AppError> {
        let status = response.status();

        if status.is_success() {
            return response.json::<T>().await.map_err(|e| {
                AppError::index_api(format!("Failed to parse response from {}: {}", endpoint, e))
            });
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<MeiliErrorBody>(&body) {
            Ok(err) => Err(AppError::index_api_full(err.message, status.as_u16(), err.code)),
            Err(_) => Err(AppError::index_api_full(
                format!("Request to {} failed ({}): {}", endpoint, status.as_u16(), body),
                status.as_u16(),
                None,
            )),
        }
    }

    /// Fetch the current state of a task.
    pub async fn get_task(&self, task_uid: u64) -> Result<Task, AppError> {
        let endpoint = format!("/tasks/{}", task_uid);
        let response = self
            .client
            .get(self.url(&endpoint))
            .send()
            .await
            .map_err(Self::transport_error)?;
        self.handle_response(response, &endpoint).await
    }
}

#[async_trait]
impl SearchIndex for MeiliClient {
    async fn get_index(&self, uid: &str) -> Result<Option<IndexInfo>, AppError> {
        let endpoint = format!("/indexes/{}", urlencoding::encode(uid));
        let response = self
            .client
            .get(self.url(&endpoint))
            .send()
            .await
            .map_err(Self::transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        self.handle_response(response, &endpoint).await.map(Some)
    }

    async fn create_index(&self, uid: &str, primary_key: &str) -> Result<TaskInfo, AppError> {
        let endpoint = "/indexes";
        let response = self
            .client
            .post(self.url(endpoint))
            .json(&serde_json::json!({ "uid": uid, "primaryKey": primary_key }))
            .send()
            .await
            .map_err(Self::transport_error)?;
        self.handle_response(response, endpoint).await
    }

    async fn get_settings(&self, uid: &str) -> Result<IndexSettings, AppError> {
        let endpoint = format!("/indexes/{}/settings", urlencoding::encode(uid));
        let response = self
            .client
            .get(self.url(&endpoint))
            .send()
            .await
            .map_err(Self::transport_error)?;
        self.handle_response(response, &endpoint).await
    }

    async fn update_settings(
        &self,
        uid: &str,
        settings: &IndexSettings,
    ) -> Result<TaskInfo, AppError> {
        let endpoint = format!("/indexes/{}/settings", urlencoding::encode(uid));
        let response = self
            .client
            .patch(self.url(&endpoint))
            .json(settings)
            .send()
            .await
            .map_err(Self::transport_error)?;
        self.handle_response(response, &endpoint).await
    }

    async fn wait_for_task(&self, task: &TaskInfo) -> Result<Task, AppError> {
        let started = Instant::now();
        let timeout = Duration::from_secs(self.config.task_timeout_secs);
        let poll_interval = Duration::from_millis(self.config.task_poll_interval_ms);

        loop {
            let current = self.get_task(task.task_uid).await?;
            if current.status.is_terminal() {
                return Ok(current);
            }

            if started.elapsed() >= timeout {
                return Err(AppError::index_api(format!(
                    "Timed out waiting for task {} (last status: {})",
                    task.task_uid, current.status
                )));
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn get_document(&self, uid: &str, id: &str) -> Result<Option<Value>, AppError> {
        let endpoint = format!(
            "/indexes/{}/documents/{}",
            urlencoding::encode(uid),
            urlencoding::encode(id)
        );
        let response = self
            .client
            .get(self.url(&endpoint))
            .query(&[("fields", "*")])
            .send()
            .await
            .map_err(Self::transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        self.handle_response(response, &endpoint).await.map(Some)
    }

    async fn add_documents(&self, uid: &str, documents: &[Value]) -> Result<TaskInfo, AppError> {
        let endpoint = format!("/indexes/{}/documents", urlencoding::encode(uid));
        let response = self
            .client
            .post(self.url(&endpoint))
            .json(documents)
            .send()
            .await
            .map_err(Self::transport_error)?;
        self.handle_response(response, &endpoint).await
    }

    async fn search(
        &self,
        uid: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse, AppError> {
        let endpoint = format!("/indexes/{}/search", urlencoding::encode(uid));
        let response = self
            .client
            .post(self.url(&endpoint))
            .json(request)
            .send()
            .await
            .map_err(Self::transport_error)?;
        self.handle_response(response, &endpoint).await
    }
}

// Typed helpers over the JSON boundary

/// Get a document and deserialize it.
///
/// A stored document that no longer matches `T` counts as absent, so it gets
/// rewritten on the next sync.
pub async fn get_typed_document<T, I>(index: &I, uid: &str, id: &str) -> Result<Option<T>, AppError>
where
    T: DeserializeOwned,
    I: SearchIndex + ?Sized,
{
    Ok(index
        .get_document(uid, id)
        .await?
        .and_then(|value| serde_json::from_value(value).ok()))
}

/// Serialize and submit a batch of documents.
pub async fn add_typed_documents<T, I>(index: &I, uid: &str, documents: &[T]) -> Result<TaskInfo, AppError>
where
    T: Serialize,
    I: SearchIndex + ?Sized,
{
    let values = documents
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    index.add_documents(uid, &values).await
}

/// Run a search and deserialize the hits.
pub async fn search_typed<T, I>(index: &I, uid: &str, request: &SearchRequest) -> Result<Vec<T>, AppError>
where
    T: DeserializeOwned,
    I: SearchIndex + ?Sized,
{
    let response = index.search(uid, request).await?;
    response
        .hits
        .into_iter()
        .map(|hit| {
            serde_json::from_value(hit)
                .map_err(|e| AppError::index_api(format!("Unexpected document in {}: {}", uid, e)))
        })
        .collect()
}
