//! `serve` command implementation: the registration gateway plus an
//! in-process worker draining the same queue.

use std::{sync::Arc, time::Duration};

use camino::Utf8PathBuf;
use clap::Parser;
use log::error;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use registrar_core::{ReplaceHint, store::SqliteCatalogStore};
use registrar_data::{Registrar, RegistrationError, ResourceKind};
use registrar_gateway::{
    AppState, CompletionWaiter, JobQueue, MemoryJobQueue, RegistrationJob, run_worker,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{net::TcpListener, task::JoinError};

use crate::{
    ARG_SOURCE_URL, ARG_TIME_LIMIT, ARG_WAIT_TIME, CliError,
    catalog::{CatalogConfig, SourceLocation},
    register::catalog_config,
};

/// Address the gateway binds when none is configured.
pub(crate) const DEFAULT_BIND: &str = "0.0.0.0:8000";
/// Redis port used when only a host is configured.
pub(crate) const DEFAULT_REDIS_PORT: u16 = 6379;
/// Poll interval in seconds.
pub(crate) const DEFAULT_WAIT_TIME: f64 = 0.3;
/// Time limit in seconds for one registration.
pub(crate) const DEFAULT_TIME_LIMIT: f64 = 300.0;

/// CLI arguments for the `serve` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Run the HTTP registration gateway. Registrations are \
                 queued in memory, or in Redis when a Redis host is \
                 configured, and registered by an in-process worker.",
    about = "Run the registration gateway"
)]
#[ortho_config(prefix = "REGISTRAR")]
pub(crate) struct ServeArgs {
    /// Socket address to listen on (default `0.0.0.0:8000`).
    #[arg(long, value_name = "addr")]
    #[serde(default)]
    pub(crate) bind: Option<String>,
    /// Redis host; without it the queue lives in memory.
    #[arg(long, value_name = "host")]
    #[serde(default)]
    pub(crate) redis_host: Option<String>,
    /// Redis port (default 6379).
    #[arg(long, value_name = "port")]
    #[serde(default)]
    pub(crate) redis_port: Option<u16>,
    /// Redis list holding pending jobs.
    #[arg(long, value_name = "key")]
    #[serde(default)]
    pub(crate) queue_key: Option<String>,
    /// Redis set of jobs held by workers.
    #[arg(long, value_name = "key")]
    #[serde(default)]
    pub(crate) progress_key: Option<String>,
    /// Redis set of succeeded jobs.
    #[arg(long, value_name = "key")]
    #[serde(default)]
    pub(crate) success_key: Option<String>,
    /// Redis set of failed jobs.
    #[arg(long, value_name = "key")]
    #[serde(default)]
    pub(crate) failure_key: Option<String>,
    /// Seconds between completion checks (default 0.3).
    #[arg(long = ARG_WAIT_TIME, value_name = "seconds")]
    #[serde(default)]
    pub(crate) wait_time: Option<f64>,
    /// Seconds a registration may take before timing out (default 300).
    #[arg(long = ARG_TIME_LIMIT, value_name = "seconds")]
    #[serde(default)]
    pub(crate) time_limit: Option<f64>,
    /// SQLite catalog database (default `catalog.db`).
    #[arg(long, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Local directory registration inputs are read from (default `.`).
    #[arg(long, value_name = "dir")]
    #[serde(default)]
    pub(crate) source_root: Option<Utf8PathBuf>,
    /// HTTP(S) base URL registration inputs are read from.
    #[arg(long = ARG_SOURCE_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) source_url: Option<String>,
    /// Base URL of distributed assets.
    #[arg(long, value_name = "url")]
    #[serde(default)]
    pub(crate) base_url: Option<String>,
    /// Map and coverage service endpoint for derived links.
    #[arg(long, value_name = "url")]
    #[serde(default)]
    pub(crate) ows_url: Option<String>,
    /// Public base URL of registered documents.
    #[arg(long, value_name = "url")]
    #[serde(default)]
    pub(crate) public_url: Option<String>,
    /// Known collection identifiers, comma separated.
    #[arg(long, value_name = "ids", value_delimiter = ',')]
    #[serde(default)]
    pub(crate) collections: Vec<String>,
}

impl ServeArgs {
    pub(crate) fn into_config(self) -> Result<ServeConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ServeConfig::try_from(merged)
    }
}

/// Connection settings for a Redis-backed queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RedisSettings {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) queue_key: Option<String>,
    pub(crate) progress_key: Option<String>,
    pub(crate) success_key: Option<String>,
    pub(crate) failure_key: Option<String>,
}

/// Resolved `serve` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ServeConfig {
    pub(crate) bind: String,
    pub(crate) redis: Option<RedisSettings>,
    pub(crate) wait_time: Duration,
    pub(crate) time_limit: Duration,
    pub(crate) catalog: CatalogConfig,
}

fn seconds(field: &'static str, value: Option<f64>, default: f64) -> Result<Duration, CliError> {
    let value = value.unwrap_or(default);
    Duration::try_from_secs_f64(value).map_err(|_| CliError::InvalidDuration { field, value })
}

impl TryFrom<ServeArgs> for ServeConfig {
    type Error = CliError;

    fn try_from(args: ServeArgs) -> Result<Self, Self::Error> {
        let wait_time = seconds(ARG_WAIT_TIME, args.wait_time, DEFAULT_WAIT_TIME)?;
        let time_limit = seconds(ARG_TIME_LIMIT, args.time_limit, DEFAULT_TIME_LIMIT)?;
        let redis = args.redis_host.map(|host| RedisSettings {
            host,
            port: args.redis_port.unwrap_or(DEFAULT_REDIS_PORT),
            queue_key: args.queue_key,
            progress_key: args.progress_key,
            success_key: args.success_key,
            failure_key: args.failure_key,
        });
        Ok(Self {
            bind: args.bind.unwrap_or_else(|| DEFAULT_BIND.to_owned()),
            redis,
            wait_time,
            time_limit,
            catalog: catalog_config!(args),
        })
    }
}

/// Failure of one queued registration.
#[derive(Debug, Error)]
pub(crate) enum JobError {
    /// The registrar rejected the resource.
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    /// The blocking registration task stopped unexpectedly.
    #[error("registration task failed: {0}")]
    Interrupted(#[from] JoinError),
}

type CatalogRegistrar = Registrar<SqliteCatalogStore>;

pub(crate) fn run_serve(args: ServeArgs) -> Result<(), CliError> {
    let config = args.into_config()?;
    let registrar = Arc::new(config.catalog.open()?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    let served = runtime.block_on(serve_with(config, Arc::clone(&registrar)));
    // The registrar owns its own runtime, which must not be dropped from
    // inside the server runtime.
    drop(runtime);
    drop(registrar);
    served
}

async fn serve_with(config: ServeConfig, registrar: Arc<CatalogRegistrar>) -> Result<(), CliError> {
    let queue = open_queue(config.redis.as_ref()).await?;
    let state = AppState::new(
        Arc::clone(&queue),
        CompletionWaiter::new(config.wait_time, config.time_limit),
    );
    let worker = tokio::spawn(drain_queue(Arc::clone(&queue), config.wait_time, registrar));
    let listener = TcpListener::bind(&config.bind)
        .await
        .map_err(|source| CliError::Bind {
            addr: config.bind.clone(),
            source,
        })?;
    let served = registrar_gateway::serve(listener, state)
        .await
        .map_err(CliError::Serve);
    worker.abort();
    served
}

async fn drain_queue(queue: Arc<dyn JobQueue>, idle: Duration, registrar: Arc<CatalogRegistrar>) {
    let handler = move |job| register_job(Arc::clone(&registrar), job);
    if let Err(err) = run_worker(queue, idle, handler).await {
        error!("registration worker stopped: {err}");
    }
}

/// Register a queued job on a blocking thread.
///
/// The job URL, reduced to host and path, is read relative to the
/// configured source.
pub(crate) async fn register_job(
    registrar: Arc<CatalogRegistrar>,
    job: RegistrationJob,
) -> Result<(), JobError> {
    let registered = tokio::task::spawn_blocking(move || {
        let kind = job.kind.parse::<ResourceKind>()?;
        registrar
            .register(kind, &job.url, ReplaceHint::Replace)
            .map(|_| ())
    })
    .await?;
    Ok(registered?)
}

async fn open_queue(redis: Option<&RedisSettings>) -> Result<Arc<dyn JobQueue>, CliError> {
    match redis {
        Some(settings) => connect_redis(settings).await,
        None => Ok(Arc::new(MemoryJobQueue::new())),
    }
}

#[cfg(feature = "queue-redis")]
async fn connect_redis(settings: &RedisSettings) -> Result<Arc<dyn JobQueue>, CliError> {
    use registrar_gateway::{QueueKeys, RedisJobQueue};

    let defaults = QueueKeys::default();
    let keys = QueueKeys {
        pending: settings.queue_key.clone().unwrap_or(defaults.pending),
        in_progress: settings.progress_key.clone().unwrap_or(defaults.in_progress),
        succeeded: settings.success_key.clone().unwrap_or(defaults.succeeded),
        failed: settings.failure_key.clone().unwrap_or(defaults.failed),
    };
    let queue = RedisJobQueue::connect(&settings.host, settings.port)
        .await?
        .with_keys(keys);
    Ok(Arc::new(queue))
}

#[cfg(not(feature = "queue-redis"))]
fn connect_redis(
    _settings: &RedisSettings,
) -> impl std::future::Future<Output = Result<Arc<dyn JobQueue>, CliError>> {
    std::future::ready(Err(CliError::MissingFeature {
        feature: "queue-redis",
        action: "a Redis queue",
    }))
}

#[cfg(test)]
pub(crate) fn serve_config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<ServeConfig, CliError> {
    let merged = ServeArgs::merge_from_layers(layers).map_err(CliError::from)?;
    ServeConfig::try_from(merged)
}
