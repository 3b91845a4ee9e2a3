//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc};

use serde::Deserialize;

use super::types::Res;

/// Default Redis endpoint for local development.
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// Default event-log stream name.
fn default_stream() -> String {
    "events:incoming".to_string()
}

/// Default dead-letter stream name.
fn default_dlq_stream() -> String {
    "events:dlq".to_string()
}

/// Default consumer group name.
fn default_consumer_group() -> String {
    "warpi-group".to_string()
}

/// Default worker identity within the consumer group.
fn default_worker_name() -> String {
    format!("worker-{}", std::process::id())
}

/// Default cap on concurrently processed entries.
fn default_max_concurrency() -> usize {
    4
}

/// Default number of retained turns per conversation.
fn default_max_turns() -> usize {
    5
}

/// Default OpenAI model to use.
fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Default HTTP ingress port.
fn default_port() -> u16 {
    3000
}

/// Configuration for the warpi application.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// The shared inner configuration values.
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// The concrete configuration values, shared behind [`Config`].
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigInner {
    /// Redis connection URL (`REDIS_URL`).
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Event-log stream name (`STREAM`).
    #[serde(default = "default_stream")]
    pub stream: String,
    /// Dead-letter stream name (`DLQ_STREAM`).
    #[serde(default = "default_dlq_stream")]
    pub dlq_stream: String,
    /// Consumer group name (`CONSUMER_GROUP`).
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    /// Worker identity within the consumer group (`WORKER_NAME`).
    #[serde(default = "default_worker_name")]
    pub worker_name: String,
    /// Maximum in-flight entries per worker process (`MAX_CONCURRENCY`).
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Maximum retained turns per conversation (`MAX_TURNS`).
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Process fetched batches one entry at a time (`SEQUENTIAL_BATCH`).
    ///
    /// Parity mode: disables concurrent dispatch and mirrors the behavior of
    /// a strictly sequential consumer.
    #[serde(default)]
    pub sequential_batch: bool,
    /// OpenAI API key (`OPENAI_API_KEY`).
    pub openai_api_key: String,
    /// OpenAI model to use (`OPENAI_MODEL`).
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    /// Slack OAuth client ID (`SLACK_CLIENT_ID`).
    pub slack_client_id: String,
    /// Slack OAuth client secret (`SLACK_CLIENT_SECRET`).
    pub slack_client_secret: String,
    /// HTTP ingress port (`PORT`).
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Config {
    /// Loads configuration from `WARPI`-prefixed environment variables,
    /// overlaid with an optional TOML file, and validates the bounds.
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("WARPI"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        if result.max_concurrency < 1 {
            return Err(anyhow::anyhow!("Max concurrency must be at least 1."));
        }

        if result.max_turns < 1 {
            return Err(anyhow::anyhow!("Max retained turns must be at least 1."));
        }

        Ok(result)
    }
}
