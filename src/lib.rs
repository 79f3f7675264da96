//! GitLab Search Sync - keeps a Meilisearch mirror of GitLab groups.
//!
//! Mirrors the members, issues, merge requests and epics of configured
//! GitLab groups into two search indexes, and serves a small search API
//! over them.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

use config::Config;
use error::AppError;
use models::GroupCache;
use services::gitlab_client::{GitLabClient, GitLabClientConfig, GitLabSource};
use services::index_settings;
use services::meili_client::{MeiliClient, MeiliClientConfig};
use services::notifier::LogNotifier;
use services::reconciler::Reconciler;
use services::scheduler::Scheduler;
use services::search::SearchState;
use services::server;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Fetch every configured group. Any failure is fatal.
pub async fn load_groups(
    gitlab: &dyn GitLabSource,
    group_ids: &[i64],
) -> Result<GroupCache, AppError> {
    let mut groups = Vec::with_capacity(group_ids.len());
    for &id in group_ids {
        let group = gitlab.get_group(id).await.map_err(|e| {
            AppError::invalid_input_field(
                format!("Failed to load group {}: {}", id, e),
                "GITLAB_GROUP_IDS",
            )
        })?;
        log::info!("[sync] Mirroring group {} ({})", group.full_path, group.id);
        groups.push(group.into());
    }
    Ok(GroupCache::new(groups))
}

/// Run the service until `cancel` is tripped.
///
/// Index settings are reconciled and groups loaded before anything else
/// starts; failures there abort startup.
pub async fn run(config: Config, cancel: CancellationToken) -> Result<(), AppError> {
    let gitlab = Arc::new(GitLabClient::new(GitLabClientConfig {
        base_url: config.gitlab_instance_url.clone(),
        token: config.gitlab_api_key.clone(),
        ..Default::default()
    })?);
    let index = Arc::new(MeiliClient::new(MeiliClientConfig {
        host: config.meili_host.clone(),
        api_key: config.meili_master_key.clone(),
        ..Default::default()
    })?);

    index_settings::ensure_all(index.as_ref()).await?;
    let groups = Arc::new(load_groups(gitlab.as_ref(), &config.group_ids).await?);

    let router = server::build_router(
        SearchState {
            index: index.clone(),
        },
        config.frontend_dist.as_deref(),
    )?;
    let server_task = server::start_server(config.port, router, cancel.clone()).await?;

    let reconciler = Arc::new(Reconciler::new(
        gitlab,
        index,
        groups,
        Arc::new(LogNotifier),
    ));
    let scheduler = Scheduler::new(reconciler, config.scheduler()).start_background(cancel.clone());

    cancel.cancelled().await;
    log::info!("[sync] Shutting down");

    scheduler.join().await;
    if let Err(e) = server_task.await {
        log::error!("[server] Server task failed: {}", e);
    }
    Ok(())
}
