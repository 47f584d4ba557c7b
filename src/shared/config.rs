use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub access_token: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub debounce_ms: u64,
    // 1 なら失敗したアクションを再キューしない
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://localhost:3000/api".to_string(),
                access_token: None,
                timeout_secs: 30,
            },
            sync: SyncConfig::default(),
            cache: CacheConfig {
                ttl_secs: 120, // 2 minutes
            },
            storage: StorageConfig {
                data_dir: default_data_dir(),
            },
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 5_000,
            max_attempts: 1,
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        // 既定値
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("RSVP_API_BASE_URL") {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                cfg.api.base_url = trimmed.trim_end_matches('/').to_string();
            }
        }
        if let Ok(v) = std::env::var("RSVP_API_TOKEN") {
            let trimmed = v.trim();
            cfg.api.access_token = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            };
        }
        if let Ok(v) = std::env::var("RSVP_API_TIMEOUT_SECS")
            && let Some(value) = parse_u64(&v)
        {
            cfg.api.timeout_secs = value.max(1);
        }
        if let Ok(v) = std::env::var("RSVP_SYNC_DEBOUNCE_MS")
            && let Some(value) = parse_u64(&v)
        {
            cfg.sync.debounce_ms = value;
        }
        if let Ok(v) = std::env::var("RSVP_SYNC_MAX_ATTEMPTS")
            && let Some(value) = parse_u32(&v)
        {
            cfg.sync.max_attempts = value.max(1);
        }
        if let Ok(v) = std::env::var("RSVP_CACHE_TTL_SECS")
            && let Some(value) = parse_u64(&v)
        {
            cfg.cache.ttl_secs = value;
        }
        if let Ok(v) = std::env::var("RSVP_DATA_DIR") {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                cfg.storage.data_dir = trimmed.to_string();
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.api.base_url.trim().is_empty() {
            return Err("API base_url must not be empty".to_string());
        }
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(format!(
                "API base_url must be an http(s) URL: {}",
                self.api.base_url
            ));
        }
        if self.api.timeout_secs == 0 {
            return Err("API timeout_secs must be greater than 0".to_string());
        }
        if self.sync.max_attempts == 0 {
            return Err("Sync max_attempts must be greater than 0".to_string());
        }
        if self.cache.ttl_secs == 0 {
            return Err("Cache ttl_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .map(|dir| dir.join("rsvp-sync"))
        .and_then(|dir| dir.to_str().map(str::to_string))
        .unwrap_or_else(|| "./data".to_string())
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

fn parse_u32(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok()
}
