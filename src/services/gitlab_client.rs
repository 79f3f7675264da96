//! GitLab API client.
//!
//! Provides HTTP client for GitLab API v4 with authentication and pagination,
//! plus the [`GitLabSource`] trait the sync engine fetches through.

use crate::error::AppError;
use crate::models::{Group, User};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Records requested per page from list endpoints.
pub const PER_PAGE: u32 = 100;

/// GitLab API client configuration.
#[derive(Debug, Clone)]
pub struct GitLabClientConfig {
    /// Base URL of the GitLab instance (e.g., `https://gitlab.com`).
    pub base_url: String,

    /// Personal access token for authentication.
    pub token: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GitLabClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            timeout_secs: 60,
        }
    }
}

/// GitLab API client.
#[derive(Debug, Clone)]
pub struct GitLabClient {
    client: Client,
    config: GitLabClientConfig,
}

/// Pagination information from GitLab API response headers.
#[derive(Debug, Clone, Default)]
pub struct PaginationInfo {
    /// Current page number.
    pub page: u32,

    /// Number of items per page.
    pub per_page: u32,

    /// Total number of pages. GitLab omits it for result sets over 10,000
    /// records.
    pub total_pages: Option<u32>,

    /// Total number of items, omitted alongside `total_pages`.
    pub total: Option<u32>,

    /// Next page number, `None` on the last page.
    pub next_page: Option<u32>,
}

/// Paginated response from GitLab API.
#[derive(Debug)]
pub struct PaginatedResponse<T> {
    /// The response data.
    pub data: Vec<T>,

    /// Pagination information.
    pub pagination: PaginationInfo,
}

/// Query parameters for listing a group's issues, merge requests or epics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupItemsQuery {
    /// Field to order by; always `updated_at` for incremental sync.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,

    /// `asc` or `desc`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,

    /// Return items updated at or after this date (ISO 8601).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_after: Option<String>,

    /// Return labels as objects instead of names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_labels_details: Option<bool>,

    /// Epics only: include epics of ancestor groups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_ancestor_groups: Option<bool>,

    /// Epics only: include epics of descendant groups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_descendant_groups: Option<bool>,

    /// Page number for pagination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Number of items per page (max 100).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
}

impl GroupItemsQuery {
    /// Newest-updated-first query for one page, optionally bounded by a cutoff.
    pub fn newest_first(page: u32, updated_after: Option<DateTime<Utc>>) -> Self {
        Self {
            order_by: Some("updated_at".to_string()),
            sort: Some("desc".to_string()),
            updated_after: updated_after.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            page: Some(page),
            per_page: Some(PER_PAGE),
            ..Default::default()
        }
    }
}

/// GitLab user from API (authors, assignees and group members).
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabUser {
    pub id: i64,
    pub username: String,
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
}

impl From<&GitLabUser> for User {
    fn from(user: &GitLabUser) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            name: user.name.clone(),
            state: user.state.clone().unwrap_or_default(),
            avatar_url: user.avatar_url.clone().unwrap_or_default(),
            web_url: user.web_url.clone().unwrap_or_default(),
        }
    }
}

/// Label object returned with `with_labels_details=true`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabLabelDetails {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub color: String,
    pub description: Option<String>,
    #[serde(default)]
    pub text_color: String,
}

/// A label entry: GitLab returns either detailed objects or bare names.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GitLabLabel {
    Detailed(GitLabLabelDetails),
    Name(String),
}

/// Reference strings of an issue or merge request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitLabReferences {
    /// Fully qualified reference, e.g. `group/project#12`.
    #[serde(default)]
    pub full: String,
}

/// GitLab issue from API.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabIssue {
    pub id: i64,
    pub iid: i64,
    pub title: String,
    pub description: Option<String>,
    pub state: String,
    pub web_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub author: Option<GitLabUser>,
    #[serde(default)]
    pub assignees: Vec<GitLabUser>,
    #[serde(default)]
    pub labels: Vec<GitLabLabel>,
    #[serde(default)]
    pub references: GitLabReferences,
    #[serde(default)]
    pub confidential: bool,
}

/// GitLab merge request from API.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabMergeRequest {
    pub id: i64,
    pub iid: i64,
    pub title: String,
    pub description: Option<String>,
    pub state: String,
    pub web_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub author: Option<GitLabUser>,
    #[serde(default)]
    pub assignees: Vec<GitLabUser>,
    #[serde(default)]
    pub labels: Vec<GitLabLabel>,
    #[serde(default)]
    pub references: GitLabReferences,
}

/// GitLab epic from API.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabEpic {
    pub id: i64,
    pub iid: i64,
    pub group_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub state: String,
    pub web_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub author: Option<GitLabUser>,
    #[serde(default)]
    pub labels: Vec<GitLabLabel>,
}

/// GitLab group from API.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabGroup {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub full_path: String,
    #[serde(default)]
    pub web_url: String,
}

impl From<GitLabGroup> for Group {
    fn from(group: GitLabGroup) -> Self {
        Self {
            id: group.id,
            name: group.name,
            full_path: group.full_path,
            web_url: group.web_url,
        }
    }
}

/// Upstream operations the sync engine depends on.
///
/// Every list operation fetches exactly one page; walking pages is the
/// paginator's job.
#[async_trait]
pub trait GitLabSource: Send + Sync {
    /// Get a single group by ID.
    async fn get_group(&self, group_id: i64) -> Result<GitLabGroup, AppError>;

    /// List one page of a group's members, including inherited members.
    async fn list_group_members(
        &self,
        group_id: i64,
        page: u32,
    ) -> Result<PaginatedResponse<GitLabUser>, AppError>;

    /// List one page of a group's issues, newest-updated first.
    async fn list_group_issues(
        &self,
        group_id: i64,
        page: u32,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<PaginatedResponse<GitLabIssue>, AppError>;

    /// List one page of a group's merge requests, newest-updated first.
    async fn list_group_merge_requests(
        &self,
        group_id: i64,
        page: u32,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<PaginatedResponse<GitLabMergeRequest>, AppError>;

    /// List one page of a group's epics (ancestor and descendant groups included),
    /// newest-updated first.
    async fn list_group_epics(
        &self,
        group_id: i64,
        page: u32,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<PaginatedResponse<GitLabEpic>, AppError>;
}

impl GitLabClient {
    /// Create a new GitLab client.
    pub fn new(config: GitLabClientConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();

        // Add the private token header for authentication
        let token_value = header::HeaderValue::from_str(&config.token)
            .map_err(|_| AppError::invalid_input_field("Invalid token format", "GITLAB_API_KEY"))?;
        headers.insert("PRIVATE-TOKEN", token_value);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Get the base URL for API requests.
    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/api/v4{}",
            self.config.base_url.trim_end_matches('/'),
            path
        )
    }

    /// Parse pagination headers from response.
    fn parse_pagination(response: &Response) -> PaginationInfo {
        let headers = response.headers();

        let get_header = |name: &str| -> Option<u32> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
        };

        let page = get_header("x-page").unwrap_or(1);
        let total_pages = get_header("x-total-pages");

        // An empty x-next-page marks the last page. Without it and without
        // totals there is nothing to go on, so assume another page.
        let next_page = if headers.contains_key("x-next-page") {
            get_header("x-next-page")
        } else if total_pages.is_none() {
            Some(page + 1)
        } else {
            None
        };

        PaginationInfo {
            page,
            per_page: get_header("x-per-page").unwrap_or(20),
            total_pages,
            total: get_header("x-total"),
            next_page,
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
            response
                .json::<T>()
                .await
                .map_err(|e| AppError::gitlab_api(format!("Failed to parse response from {}: {}", endpoint, e)))
        } else if status == StatusCode::UNAUTHORIZED {
            Err(AppError::authentication_expired(
                "GitLab token expired or revoked",
            ))
        } else {
            let status_code = status.as_u16();
            let body = response.text().await.unwrap_or_default();
            let body_message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| {
                    // GitLab returns errors as {"message": "..."} or {"error": "..."}
                    v.get("message").or_else(|| v.get("error")).map(|m| match m.as_str() {
                        Some(s) => s.to_string(),
                        // Sometimes "message" is an object like {"base":["msg"]}
                        None => m.to_string(),
                    })
                });

            let message = match (status, &body_message) {
                (StatusCode::FORBIDDEN, _) => "Access denied".to_string(),
                (StatusCode::NOT_FOUND, _) => "Resource not found".to_string(),
                (StatusCode::TOO_MANY_REQUESTS, _) => "Rate limit exceeded".to_string(),
                (_, Some(msg)) => msg.clone(),
                _ => format!("Request failed ({}): {}", status_code, body),
            };

            Err(AppError::gitlab_api_full(message, status_code, endpoint))
        }
    }

    /// Make a GET request with pagination support.
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &impl Serialize,
    ) -> Result<PaginatedResponse<T>, AppError> {
        let url = self.api_url(endpoint);

        let response = self.client.get(&url).query(query).send().await?;
        let pagination = Self::parse_pagination(&response);
        let data = self.handle_response::<Vec<T>>(response, endpoint).await?;

        Ok(PaginatedResponse { data, pagination })
    }
}

#[async_trait]
impl GitLabSource for GitLabClient {
    async fn get_group(&self, group_id: i64) -> Result<GitLabGroup, AppError> {
        let endpoint = format!("/groups/{}", group_id);
        let url = self.api_url(&endpoint);
        let response = self
            .client
            .get(&url)
            .query(&[("with_projects", "false")])
            .send()
            .await?;
        self.handle_response(response, &endpoint).await
    }

    async fn list_group_members(
        &self,
        group_id: i64,
        page: u32,
    ) -> Result<PaginatedResponse<GitLabUser>, AppError> {
        let endpoint = format!("/groups/{}/members/all", group_id);
        self.get_paginated(
            &endpoint,
            &[("page", page.to_string()), ("per_page", PER_PAGE.to_string())],
        )
        .await
    }

    async fn list_group_issues(
        &self,
        group_id: i64,
        page: u32,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<PaginatedResponse<GitLabIssue>, AppError> {
        let endpoint = format!("/groups/{}/issues", group_id);
        let query = GroupItemsQuery {
            with_labels_details: Some(true),
            ..GroupItemsQuery::newest_first(page, updated_after)
        };
        self.get_paginated(&endpoint, &query).await
    }

    async fn list_group_merge_requests(
        &self,
        group_id: i64,
        page: u32,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<PaginatedResponse<GitLabMergeRequest>, AppError> {
        let endpoint = format!("/groups/{}/merge_requests", group_id);
        let query = GroupItemsQuery {
            with_labels_details: Some(true),
            ..GroupItemsQuery::newest_first(page, updated_after)
        };
        self.get_paginated(&endpoint, &query).await
    }

    async fn list_group_epics(
        &self,
        group_id: i64,
        page: u32,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<PaginatedResponse<GitLabEpic>, AppError> {
        let endpoint = format!("/groups/{}/epics", group_id);
        let query = GroupItemsQuery {
            include_ancestor_groups: Some(true),
            include_descendant_groups: Some(true),
            ..GroupItemsQuery::newest_first(page, updated_after)
        };
        self.get_paginated(&endpoint, &query).await
    }
}
