use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

use crate::queue::ConsumerSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub mongodb: MongoConfig,
    pub redis: RedisConfig,
    pub cache: CacheConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    /// Prefix of the per-consumer in-flight lists.
    pub consumer: String,
    pub max_deliveries: u32,
    pub receive_timeout_secs: u64,
}

impl QueueConfig {
    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            max_deliveries: self.max_deliveries.max(1),
            receive_timeout: Duration::from_secs(self.receive_timeout_secs.max(1)),
        }
    }

    /// Identity of the `index`-th consumer of this process.
    pub fn consumer_name(&self, index: usize) -> String {
        format!("{}-{}", self.consumer, index)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub worker_count: usize,
}

impl IngestionConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(IngestionConfig {
            common,
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", None, is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("finance_db"), is_prod)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", Some("redis://localhost:6379"), is_prod)?,
            },
            cache: CacheConfig {
                enabled: parse_env("CACHE_ENABLED", Some("true"), is_prod)?,
                ttl_secs: parse_env("CACHE_TTL_SECS", Some("1800"), is_prod)?,
            },
            queue: QueueConfig {
                name: get_env("QUEUE_NAME", Some("csv_processing_queue"), is_prod)?,
                consumer: get_env("QUEUE_CONSUMER", Some("worker"), is_prod)?,
                max_deliveries: parse_env("QUEUE_MAX_DELIVERIES", Some("5"), is_prod)?,
                receive_timeout_secs: parse_env("QUEUE_RECEIVE_TIMEOUT_SECS", Some("5"), is_prod)?,
            },
            worker: WorkerConfig {
                enabled: parse_env("WORKER_ENABLED", Some("true"), is_prod)?,
                worker_count: parse_env("WORKER_COUNT", Some("1"), is_prod)?,
            },
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
        })
    }

    pub fn log_level(&self) -> String {
        env::var("LOG_LEVEL").unwrap_or_else(|_| self.common.log_level.clone())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, default, is_prod)?;
    raw.trim()
        .parse()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid value for {}: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_key_is_a_config_error() {
        let err = get_env("INGESTION_TEST_SURELY_UNSET", None, false).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn defaults_apply_outside_production() {
        let value: u32 = parse_env("INGESTION_TEST_SURELY_UNSET", Some("7"), false).unwrap();
        assert_eq!(value, 7);
        assert!(get_env("INGESTION_TEST_SURELY_UNSET", Some("x"), true).is_err());
    }

    #[test]
    fn consumer_settings_are_never_zero() {
        let queue = QueueConfig {
            name: "q".into(),
            consumer: "worker".into(),
            max_deliveries: 0,
            receive_timeout_secs: 0,
        };
        let settings = queue.consumer_settings();
        assert_eq!(settings.max_deliveries, 1);
        assert_eq!(settings.receive_timeout, Duration::from_secs(1));
        assert_eq!(queue.consumer_name(2), "worker-2");
    }
}
