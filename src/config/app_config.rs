use std::time::Duration;

use serde::Deserialize;

use crate::domain::DomainError;
use crate::infrastructure::query::QueryCacheConfig;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Connection settings for the hosted backend
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL including the API version, e.g. `https://cloud.appwrite.io/v1`
    pub endpoint: String,
    pub project_id: String,
    pub database_id: String,
    pub users_collection_id: String,
    pub posts_collection_id: String,
    pub saves_collection_id: String,
    pub storage_bucket_id: String,
    pub timeout_secs: u64,
    /// Server key; when unset requests run with the signed-in session only
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Unset keeps entries fresh until invalidated
    pub stale_time_secs: Option<u64>,
    pub gc_time_secs: u64,
    pub gc_interval_secs: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://cloud.appwrite.io/v1".to_string(),
            project_id: String::new(),
            database_id: String::new(),
            users_collection_id: String::new(),
            posts_collection_id: String::new(),
            saves_collection_id: String::new(),
            storage_bucket_id: String::new(),
            timeout_secs: 30,
            api_key: None,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Checks that every identifier needed to reach the backend is set
    pub fn validate(&self) -> Result<(), DomainError> {
        let required = [
            ("endpoint", &self.endpoint),
            ("project_id", &self.project_id),
            ("database_id", &self.database_id),
            ("users_collection_id", &self.users_collection_id),
            ("posts_collection_id", &self.posts_collection_id),
            ("saves_collection_id", &self.saves_collection_id),
            ("storage_bucket_id", &self.storage_bucket_id),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(DomainError::configuration(format!(
                "Missing remote settings: {}",
                missing.join(", ")
            )));
        }

        if self.timeout_secs == 0 {
            return Err(DomainError::configuration("timeout_secs must be positive"));
        }

        Ok(())
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("endpoint", &self.endpoint)
            .field("project_id", &self.project_id)
            .field("database_id", &self.database_id)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_secs: None,
            gc_time_secs: 300,
            gc_interval_secs: 60,
        }
    }
}

impl From<&CacheConfig> for QueryCacheConfig {
    fn from(config: &CacheConfig) -> Self {
        let cache = QueryCacheConfig::default()
            .with_gc_time(Duration::from_secs(config.gc_time_secs))
            .with_gc_interval(Duration::from_secs(config.gc_interval_secs));

        match config.stale_time_secs {
            Some(secs) => cache.with_stale_time(Duration::from_secs(secs)),
            None => cache,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
