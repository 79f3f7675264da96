//! HTTP server for the search API and the optional frontend.
//!
//! Serves the `/api/v1` search routes and, when a frontend dist directory is
//! configured, its static files with an SPA fallback to `index.html`.

use crate::error::AppError;
use crate::services::search::{search_routes, SearchState};
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::services::ServeDir;

/// Build the full router.
///
/// Without a frontend, every unmatched path is a 404. With one, unmatched
/// `/api/*` paths still get a plain 404 and everything else goes to
/// [`Frontend`].
pub fn build_router(state: SearchState, frontend_dist: Option<&Path>) -> Result<Router, AppError> {
    let api = search_routes(state);

    let Some(dist) = frontend_dist else {
        return Ok(api);
    };

    let frontend = Frontend::load(dist)?;
    Ok(api
        .route("/api/{*path}", any(|| async { StatusCode::NOT_FOUND }))
        .fallback(move |req: Request| frontend.clone().serve(req)))
}

/// Built frontend: static assets plus the `index.html` shell for
/// client-side routes.
#[derive(Clone)]
struct Frontend {
    assets: ServeDir,
    shell: Arc<str>,
}

impl Frontend {
    /// The shell is read once; a dist directory without one is rejected.
    fn load(dist: &Path) -> Result<Self, AppError> {
        let shell = std::fs::read_to_string(dist.join("index.html")).map_err(|e| {
            AppError::invalid_input_field(
                format!("Failed to read index.html from {}: {}", dist.display(), e),
                "FRONTEND_DIST",
            )
        })?;

        Ok(Self {
            assets: ServeDir::new(dist),
            shell: shell.into(),
        })
    }

    async fn serve(self, req: Request) -> Response {
        match self.assets.oneshot(req).await {
            Ok(res) if res.status() != StatusCode::NOT_FOUND => res.into_response(),
            _ => Html(self.shell.to_string()).into_response(),
        }
    }
}

/// Bind `port` on all interfaces and serve until `cancel` is tripped.
///
/// Returns once the listener is bound; the server runs on a spawned task.
pub async fn start_server(
    port: u16,
    router: Router,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, AppError> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind to port {}: {}", port, e)))?;

    log::info!("[server] Listening on http://0.0.0.0:{}", port);

    Ok(tokio::spawn(async move {
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            cancel.cancelled().await;
        });

        if let Err(e) = server.await {
            log::error!("[server] Server error: {}", e);
        }

        log::info!("[server] Server stopped");
    }))
}
