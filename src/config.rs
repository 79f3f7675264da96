//! Runtime configuration read from environment variables.

use crate::error::AppError;
use crate::services::scheduler::SchedulerConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8080;

const DEFAULT_USER_INTERVAL: &str = "6h";
const DEFAULT_ITEM_INTERVAL: &str = "5m";

/// Service configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub meili_host: String,
    pub meili_master_key: String,
    pub gitlab_api_key: String,
    pub gitlab_instance_url: String,
    /// Groups to mirror, in configuration order.
    pub group_ids: Vec<i64>,
    pub user_update_interval: Duration,
    pub item_update_interval: Duration,
    pub port: u16,
    /// Built frontend to serve next to the API, if any.
    pub frontend_dist: Option<PathBuf>,
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which returns a variable's value.
    ///
    /// Variables set to an empty value count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| {
            optional(key).ok_or_else(|| {
                AppError::invalid_input_field(format!("Missing environment variable {}", key), key)
            })
        };

        let port = match optional("PORT") {
            Some(value) => value.trim().parse::<u16>().map_err(|e| {
                AppError::invalid_input_field(format!("PORT is not a valid port: {}", e), "PORT")
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            meili_host: required("MEILI_HOST")?,
            meili_master_key: required("MEILI_MASTER_KEY")?,
            gitlab_api_key: required("GITLAB_API_KEY")?,
            gitlab_instance_url: required("GITLAB_INSTANCE_URL")?,
            group_ids: parse_group_ids(&required("GITLAB_GROUP_IDS")?)?,
            user_update_interval: parse_interval(
                "USER_UPDATE_INTERVAL",
                optional("USER_UPDATE_INTERVAL").as_deref().unwrap_or(DEFAULT_USER_INTERVAL),
            )?,
            item_update_interval: parse_interval(
                "ITEM_UPDATE_INTERVAL",
                optional("ITEM_UPDATE_INTERVAL").as_deref().unwrap_or(DEFAULT_ITEM_INTERVAL),
            )?,
            port,
            frontend_dist: optional("FRONTEND_DIST").map(PathBuf::from),
        })
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            user_interval: self.user_update_interval,
            item_interval: self.item_update_interval,
        }
    }
}

/// Parse a comma separated list of group IDs.
fn parse_group_ids(value: &str) -> Result<Vec<i64>, AppError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>().map_err(|_| {
                AppError::invalid_input_field(
                    format!("Group ID {:?} is not a number", part),
                    "GITLAB_GROUP_IDS",
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .and_then(|ids| {
            if ids.is_empty() {
                Err(AppError::invalid_input_field(
                    "No group IDs configured",
                    "GITLAB_GROUP_IDS",
                ))
            } else {
                Ok(ids)
            }
        })
}

/// Parse a human-readable interval such as `5m` or `6h`.
fn parse_interval(key: &str, value: &str) -> Result<Duration, AppError> {
    let interval = humantime::parse_duration(value.trim()).map_err(|e| {
        AppError::invalid_input_field(format!("{} is not a valid duration: {}", key, e), key)
    })?;

    if interval.is_zero() {
        return Err(AppError::invalid_input_field(
            format!("{} must be greater than zero", key),
            key,
        ));
    }
    Ok(interval)
}
