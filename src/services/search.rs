//! Read path over the mirrored indexes, exposed as REST routes.

use crate::error::AppError;
use crate::models::{Item, User};
use crate::services::index_settings::{ITEMS_INDEX, USERS_INDEX};
use crate::services::meili_client::{search_typed, SearchIndex, SearchRequest};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Maximum hits returned per search.
pub const SEARCH_LIMIT: usize = 10;

fn request(q: &str) -> SearchRequest {
    SearchRequest {
        q: q.to_string(),
        limit: Some(SEARCH_LIMIT),
        attributes_to_retrieve: Some(vec!["*".to_string()]),
        ..Default::default()
    }
}

/// Search mirrored users by name, username or ID.
pub async fn search_users(index: &dyn SearchIndex, q: &str) -> Result<Vec<User>, AppError> {
    search_typed(index, USERS_INDEX, &request(q)).await
}

/// Search mirrored issues, merge requests and epics.
pub async fn search_items(index: &dyn SearchIndex, q: &str) -> Result<Vec<Item>, AppError> {
    search_typed(index, ITEMS_INDEX, &request(q)).await
}

// ── Error handling ───────────────────────────────────────────────────────────

/// JSON error body.
#[derive(Serialize)]
struct ApiError {
    code: String,
    message: String,
}

/// Wrapper to make AppError usable as an axum error response.
struct ApiErr(AppError);

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            AppError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            AppError::IndexApi { .. } | AppError::IndexTask { .. } => {
                (StatusCode::BAD_GATEWAY, "INDEX_UNAVAILABLE")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        (
            status,
            Json(ApiError {
                code: code.to_string(),
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<AppError> for ApiErr {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

// ── Routes ───────────────────────────────────────────────────────────────────

/// Shared state for the search routes.
#[derive(Clone)]
pub struct SearchState {
    pub index: Arc<dyn SearchIndex>,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

/// Build the `/api/v1` search routes.
pub fn search_routes(state: SearchState) -> Router {
    Router::new()
        .route("/api/v1/users/search", get(users_handler))
        .route("/api/v1/items/search", get(items_handler))
        .with_state(state)
}

async fn users_handler(
    State(state): State<SearchState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<User>>, ApiErr> {
    let users = search_users(state.index.as_ref(), &query.q).await?;
    Ok(Json(users))
}

async fn items_handler(
    State(state): State<SearchState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Item>>, ApiErr> {
    let items = search_items(state.index.as_ref(), &query.q).await?;
    Ok(Json(items))
}
