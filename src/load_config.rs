/// `load_config` module: loads the static YAML config and injects secrets from the environment.
///
/// This is the only place where user-supplied YAML is parsed into the typed
/// [`SynchroniseConfig`] and [`StoreSettings`].
///
/// # Environment
/// - `PO_INGEST_BUCKET`: overrides `bucket` from the file.
/// - `PO_INGEST_ACCESS_KEY_ID` / `PO_INGEST_SECRET_ACCESS_KEY`: static credentials.
///   Both or neither; without them the AWS default credential chain applies.
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{error, info};

use crate::config::SynchroniseConfig;
use crate::s3::{StaticCredentials, StoreSettings};

pub const BUCKET_ENV: &str = "PO_INGEST_BUCKET";
pub const ACCESS_KEY_ENV: &str = "PO_INGEST_ACCESS_KEY_ID";
pub const SECRET_KEY_ENV: &str = "PO_INGEST_SECRET_ACCESS_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub pipeline: SynchroniseConfig,
    #[serde(default)]
    pub store: StoreSettings,
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Loads a static YAML config file (no secrets) and injects required env vars for secrets.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let mut config: CliConfig = serde_yaml::from_str(&config_content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow::anyhow!("Failed to parse config YAML: {e}")
    })?;

    if let Some(bucket) = non_empty_env(BUCKET_ENV) {
        info!(bucket = %bucket, "{BUCKET_ENV} overrides configured bucket");
        config.pipeline.bucket = bucket;
    }

    config.store.credentials = match (non_empty_env(ACCESS_KEY_ENV), non_empty_env(SECRET_KEY_ENV)) {
        (Some(access_key_id), Some(secret_access_key)) => Some(StaticCredentials {
            access_key_id,
            secret_access_key,
        }),
        (None, None) => {
            info!("No static credentials in env, using the default AWS credential chain");
            None
        }
        _ => {
            error!("Only one of {ACCESS_KEY_ENV} / {SECRET_KEY_ENV} is set");
            bail!("{ACCESS_KEY_ENV} and {SECRET_KEY_ENV} must be set together");
        }
    };

    config
        .pipeline
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path_ref.display()))?;

    config.pipeline.trace_loaded();
    Ok(config)
}
