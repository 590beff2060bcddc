//! Configuration management

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::{
    ingest::{
        ProcessorSettings, DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_FLUSH_SIZE, DEFAULT_MAX_LINE_BYTES,
    },
    queue::{
        local::{DEFAULT_CONCURRENCY, DEFAULT_JOB_TIMEOUT_SECS},
        Backoff, QueueSettings,
    },
};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 5000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default upload body limit (100 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/logingest";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

// ============================================================================
// Ingestion Configuration Constants
// ============================================================================

/// Default directory for uploaded files.
pub const DEFAULT_UPLOADS_DIR: &str = "uploads";

/// Default attempts per job, first run included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default first retry delay in milliseconds; doubles on each attempt.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 5000;

/// Files below this size are scheduled with high priority (1 MiB).
pub const DEFAULT_PRIORITY_THRESHOLD_BYTES: u64 = 1024 * 1024;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub store: StoreBackend,
    pub ingest: IngestConfig,
    pub cors: CorsConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
    pub max_upload_bytes: usize,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Which [`crate::store::LogStore`] the server runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(anyhow::anyhow!("Unknown store backend: {}", other)),
        }
    }
}

/// Ingestion pipeline and queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub uploads_dir: PathBuf,
    pub worker_concurrency: usize,
    pub checkpoint_interval: i64,
    pub flush_size: usize,
    pub max_line_bytes: usize,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub priority_threshold_bytes: u64,
    pub job_timeout_secs: u64,
}

impl IngestConfig {
    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            concurrency: self.worker_concurrency,
            job_timeout: Duration::from_secs(self.job_timeout_secs),
        }
    }

    pub fn processor_settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            checkpoint_interval: self.checkpoint_interval,
            flush_size: self.flush_size,
            max_line_bytes: self.max_line_bytes,
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::Exponential {
            base: Duration::from_millis(self.backoff_base_ms),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from(DEFAULT_UPLOADS_DIR),
            worker_concurrency: DEFAULT_CONCURRENCY,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            flush_size: DEFAULT_FLUSH_SIZE,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            priority_threshold_bytes: DEFAULT_PRIORITY_THRESHOLD_BYTES,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Parsed value of `key`, or `default` when unset or unparseable.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let store = match std::env::var("LOGINGEST_STORE") {
            Ok(value) => value.parse()?,
            Err(_) => StoreBackend::default(),
        };

        let config = Config {
            server: ServerConfig {
                host: std::env::var("LOGINGEST_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_or("LOGINGEST_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_or(
                    "LOGINGEST_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
                max_upload_bytes: env_or("LOGINGEST_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or("DATABASE_IDLE_TIMEOUT", DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            store,
            ingest: IngestConfig {
                uploads_dir: std::env::var("INGEST_UPLOADS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_UPLOADS_DIR)),
                worker_concurrency: env_or("INGEST_WORKER_CONCURRENCY", DEFAULT_CONCURRENCY),
                checkpoint_interval: env_or(
                    "INGEST_CHECKPOINT_INTERVAL",
                    DEFAULT_CHECKPOINT_INTERVAL,
                ),
                flush_size: env_or("INGEST_FLUSH_SIZE", DEFAULT_FLUSH_SIZE),
                max_line_bytes: env_or("INGEST_MAX_LINE_BYTES", DEFAULT_MAX_LINE_BYTES),
                max_attempts: env_or("INGEST_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
                backoff_base_ms: env_or("INGEST_BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS),
                priority_threshold_bytes: env_or(
                    "INGEST_PRIORITY_THRESHOLD_BYTES",
                    DEFAULT_PRIORITY_THRESHOLD_BYTES,
                ),
                job_timeout_secs: env_or("INGEST_JOB_TIMEOUT_SECS", DEFAULT_JOB_TIMEOUT_SECS),
            },
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env_or("CORS_ALLOW_CREDENTIALS", true),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.server.max_upload_bytes == 0 {
            anyhow::bail!("Upload size limit must be greater than 0");
        }

        if self.store == StoreBackend::Postgres {
            if self.database.url.is_empty() {
                anyhow::bail!("Database URL cannot be empty");
            }

            if self.database.max_connections == 0 {
                anyhow::bail!("Database max_connections must be greater than 0");
            }

            if self.database.min_connections > self.database.max_connections {
                anyhow::bail!(
                    "Database min_connections ({}) cannot be greater than max_connections ({})",
                    self.database.min_connections,
                    self.database.max_connections
                );
            }
        }

        if self.ingest.worker_concurrency == 0 {
            anyhow::bail!("Ingest worker concurrency must be greater than 0");
        }

        if self.ingest.checkpoint_interval <= 0 {
            anyhow::bail!("Checkpoint interval must be greater than 0");
        }

        if self.ingest.flush_size == 0 {
            anyhow::bail!("Flush size must be greater than 0");
        }

        if self.ingest.max_line_bytes == 0 {
            anyhow::bail!("Max line length must be greater than 0");
        }

        if self.ingest.max_attempts == 0 {
            anyhow::bail!("Max attempts must be at least 1");
        }

        if self.ingest.job_timeout_secs == 0 {
            anyhow::bail!("Job timeout must be greater than 0");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            store: StoreBackend::default(),
            ingest: IngestConfig::default(),
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_defaults_match_pipeline_contract() {
        let ingest = IngestConfig::default();
        assert_eq!(ingest.worker_concurrency, 2);
        assert_eq!(ingest.checkpoint_interval, 100);
        assert_eq!(ingest.max_attempts, 3);
        assert_eq!(ingest.priority_threshold_bytes, 1024 * 1024);
        assert_eq!(ingest.processor_settings().max_line_bytes, 1024 * 1024);
        assert_eq!(
            ingest.backoff().delay_for(2),
            Duration::from_millis(2 * DEFAULT_BACKOFF_BASE_MS)
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.database.min_connections = 20;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ingest.checkpoint_interval = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ingest.worker_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ingest.max_line_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_memory_backend_skips_database_checks() {
        let mut config = Config::default();
        config.store = StoreBackend::Memory;
        config.database.url = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_store_backend_from_str() {
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!("Postgres".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert!("redis".parse::<StoreBackend>().is_err());
    }
}
