use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub database: DatabaseConfig,

    pub cache: CacheConfig,

    pub providers: ProviderConfig,

    pub jobs: JobsConfig,

    pub scheduler: SchedulerConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,

    /// `pretty` or `json`
    pub log_format: String,

    /// 0 lets tokio decide.
    pub worker_threads: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            worker_threads: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            cors_allowed_origins: vec!["*".to_string()],
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,

    pub max_connections: u32,

    pub min_connections: u32,

    /// Bound on single reads and writes.
    pub operation_timeout_seconds: u64,

    /// Bound on bulk inserts and deletes.
    pub bulk_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:data/animeverse.db".to_string(),
            max_connections: 5,
            min_connections: 1,
            operation_timeout_seconds: 5,
            bulk_timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_seconds)
    }

    #[must_use]
    pub const fn bulk_timeout(&self) -> Duration {
        Duration::from_secs(self.bulk_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis connection string. Without one an in-process cache is used.
    pub redis_url: Option<String>,

    pub record_ttl_seconds: u64,

    pub trending_ttl_seconds: u64,

    pub popular_ttl_seconds: u64,

    pub browse_ttl_seconds: u64,

    pub spotlight_ttl_seconds: u64,

    pub search_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            record_ttl_seconds: 3600,
            trending_ttl_seconds: 300,
            popular_ttl_seconds: 300,
            browse_ttl_seconds: 600,
            spotlight_ttl_seconds: 900,
            search_ttl_seconds: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub anilist_url: String,

    pub jikan_url: String,

    pub offline_db_url: String,

    pub request_timeout_seconds: u64,

    pub user_agent: String,

    /// Token bucket for interactive calls to the GraphQL provider.
    pub requests_per_minute: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            anilist_url: "https://graphql.anilist.co".to_string(),
            jikan_url: "https://api.jikan.moe/v4".to_string(),
            offline_db_url: "https://github.com/manami-project/anime-offline-database/releases/latest/download/anime-offline-database-minified.json.zst".to_string(),
            request_timeout_seconds: 10,
            user_agent: "AnimeVerse/1.0".to_string(),
            requests_per_minute: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Background tasks running at once.
    pub max_concurrent: usize,

    /// Background tasks waiting or running before new ones are dropped.
    pub max_pending: usize,

    pub backfill_delay_ms: u64,

    pub import_batch_size: usize,

    /// Where the downloaded offline dataset is kept.
    pub data_dir: String,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_pending: 256,
            backfill_delay_ms: 700,
            import_batch_size: 1000,
            data_dir: "data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,

    pub season_update_cron: String,

    pub image_sweep_cron: String,

    pub image_sweep_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            season_update_cron: "0 0 4 * * *".to_string(),
            image_sweep_cron: "0 30 * * * *".to_string(),
            image_sweep_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let paths = Self::config_paths();

        let mut config = None;
        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                config = Some(Self::load_from_path(path)?);
                break;
            }
        }

        let mut config = config.unwrap_or_else(|| {
            info!("No config file found, using defaults");
            Self::default()
        });
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Environment wins over the file for connection settings.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("ANIMEVERSE_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(url) = lookup("ANIMEVERSE_REDIS_URL") {
            self.cache.redis_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Some(port) = lookup("ANIMEVERSE_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("animeverse").join("config.toml"));
        }

        paths
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = PathBuf::from("config.toml");
        if path.exists() {
            Ok(false)
        } else {
            Self::default().save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            anyhow::bail!("database.url cannot be empty");
        }

        if self.database.operation_timeout_seconds == 0 || self.database.bulk_timeout_seconds == 0 {
            anyhow::bail!("database timeouts must be > 0");
        }

        if let Some(redis_url) = &self.cache.redis_url {
            url::Url::parse(redis_url).context("Invalid cache.redis_url")?;
        }

        for (name, value) in [
            ("providers.anilist_url", &self.providers.anilist_url),
            ("providers.jikan_url", &self.providers.jikan_url),
            ("providers.offline_db_url", &self.providers.offline_db_url),
        ] {
            url::Url::parse(value).with_context(|| format!("Invalid {name}"))?;
        }

        if self.providers.requests_per_minute == 0 {
            anyhow::bail!("providers.requests_per_minute must be > 0");
        }

        if self.jobs.max_concurrent == 0 || self.jobs.max_pending < self.jobs.max_concurrent {
            anyhow::bail!("jobs.max_pending must be >= jobs.max_concurrent > 0");
        }

        if self.jobs.import_batch_size == 0 {
            anyhow::bail!("jobs.import_batch_size must be > 0");
        }

        if !matches!(self.general.log_format.as_str(), "pretty" | "json") {
            anyhow::bail!("general.log_format must be 'pretty' or 'json'");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.cache.record_ttl_seconds, 3600);
        assert_eq!(config.jobs.backfill_delay_ms, 700);
        assert_eq!(config.jobs.import_batch_size, 1000);
        assert!(config.cache.redis_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[cache]"));
        assert!(toml_str.contains("[jobs]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [cache]
            redis_url = "redis://127.0.0.1:6379"
            trending_ttl_seconds = 60
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.cache.trending_ttl_seconds, 60);
        assert_eq!(config.cache.popular_ttl_seconds, 300);
        assert_eq!(config.database.operation_timeout_seconds, 5);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| match key {
            "ANIMEVERSE_DATABASE_URL" => Some("sqlite::memory:".to_string()),
            "ANIMEVERSE_PORT" => Some("9100".to_string()),
            _ => None,
        });
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.server.port, 9100);
        assert!(config.cache.redis_url.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.jobs.max_concurrent = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cache.redis_url = Some("not a url".to_string());
        assert!(config.validate().is_err());
    }
}
