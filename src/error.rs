//! Application error types.
//!
//! These errors are serializable so the search API can return them as
//! structured JSON bodies. The variants follow the failure taxonomy of the
//! sync engine: upstream fetch failures, search index protocol failures and
//! index task failures are kept distinct so operators can tell a rejected
//! write from a lost one.

use serde::Serialize;
use thiserror::Error;

/// Application-level errors.
///
/// All variants serialize to a structured JSON object.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    /// GitLab API request failed.
    #[error("GitLab API error: {message}")]
    GitLabApi {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
    },

    /// Network request to GitLab failed.
    #[error("Network error: {message}")]
    Network { message: String },

    /// GitLab token expired or revoked.
    #[error("Token expired: {message}")]
    AuthenticationExpired { message: String },

    /// Search index could not be reached or returned an unparsable response.
    #[error("Search index error: {message}")]
    IndexApi {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// Search index accepted a task that did not succeed.
    #[error("Index task {task_uid} ended as {status}: {message}")]
    IndexTask {
        task_uid: u64,
        status: String,
        message: String,
    },

    /// Invalid input provided (configuration, query parameters).
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },

    /// Sync cycle finished with some parts failing.
    #[error("Sync error: {message}")]
    Sync { message: String },

    /// Internal application error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a GitLab API error.
    pub fn gitlab_api(message: impl Into<String>) -> Self {
        Self::GitLabApi {
            message: message.into(),
            status_code: None,
            endpoint: None,
        }
    }

    /// Create a GitLab API error with status code and endpoint.
    pub fn gitlab_api_full(
        message: impl Into<String>,
        status_code: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self::GitLabApi {
            message: message.into(),
            status_code: Some(status_code),
            endpoint: Some(endpoint.into()),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an authentication expired error.
    pub fn authentication_expired(message: impl Into<String>) -> Self {
        Self::AuthenticationExpired {
            message: message.into(),
        }
    }

    /// Create a search index protocol error.
    pub fn index_api(message: impl Into<String>) -> Self {
        Self::IndexApi {
            message: message.into(),
            status_code: None,
            code: None,
        }
    }

    /// Create a search index protocol error with the HTTP status and Meilisearch error code.
    pub fn index_api_full(
        message: impl Into<String>,
        status_code: u16,
        code: Option<String>,
    ) -> Self {
        Self::IndexApi {
            message: message.into(),
            status_code: Some(status_code),
            code,
        }
    }

    /// Create an index task failure.
    pub fn index_task(task_uid: u64, status: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IndexTask {
            task_uid,
            status: status.into(),
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: None,
        }
    }

    /// Create an invalid input error with field name.
    pub fn invalid_input_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a sync error.
    pub fn sync(message: impl Into<String>) -> Self {
        Self::Sync {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error came from reaching the upstream GitLab instance.
    pub fn is_remote_fetch(&self) -> bool {
        matches!(
            self,
            Self::GitLabApi { .. } | Self::Network { .. } | Self::AuthenticationExpired { .. }
        )
    }

    /// Whether the index accepted a write whose task did not succeed.
    pub fn is_index_task(&self) -> bool {
        matches!(self, Self::IndexTask { .. })
    }
}

// Conversions from common error types

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network("Request timed out")
        } else if err.is_connect() {
            Self::network("Failed to connect to server")
        } else if err.is_status() {
            Self::gitlab_api(format!("HTTP error: {}", err))
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {}", err))
    }
}
