use crate::domain::value_objects::{EventId, UserId};
use crate::shared::error::AppError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// 関係・応答系キーの名前空間。ユーザー単位の無効化で常に消す。
const USER_SCOPED_NAMESPACES: [&str; 2] = ["relations:", "responses:"];

/// キャッシュキーの組み立て
pub struct CacheKey;

impl CacheKey {
    pub fn all_events() -> String {
        "events:all".to_string()
    }

    pub fn my_events(user_id: &UserId) -> String {
        format!("events:my:{user_id}")
    }

    pub fn event(event_id: &EventId) -> String {
        format!("event:{event_id}")
    }

    pub fn friends(user_id: &UserId) -> String {
        format!("relations:friends:{user_id}")
    }

    pub fn user(user_id: &UserId) -> String {
        format!("users:{user_id}")
    }
}

#[derive(Clone)]
struct CacheEntry {
    data: serde_json::Value,
    expires_at: Instant,
}

/// 一括読み込みクエリ用の短命なメモリキャッシュ
pub struct ReadThroughCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ReadThroughCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// TTL 内の値を返す。`None` はキャッシュミスで、空リストとは区別される。
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;

        if entry.expires_at <= Instant::now() {
            debug!("cache expired: {key}");
            return None;
        }

        match serde_json::from_value(entry.data.clone()) {
            Ok(value) => {
                debug!("cache hit: {key}");
                Some(value)
            }
            Err(e) => {
                debug!("cache entry {key} has unexpected shape: {e}");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), AppError> {
        let data = serde_json::to_value(value)
            .map_err(|e| AppError::SerializationError(e.to_string()))?;
        let entry = CacheEntry {
            data,
            expires_at: Instant::now() + self.ttl,
        };

        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    pub async fn delete(&self, key: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
    }

    /// 指定ユーザーを参照するキーと、関係・応答の名前空間を削除
    pub async fn invalidate_user(&self, user_id: &UserId) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key_references_user(key, user_id));
        let removed = before - entries.len();
        debug!("invalidated {removed} cache entries for {user_id}");
        removed
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }

    /// 期限切れのエントリを削除
    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn key_references_user(key: &str, user_id: &UserId) -> bool {
    USER_SCOPED_NAMESPACES
        .iter()
        .any(|namespace| key.starts_with(namespace))
        || key.split(':').any(|segment| segment == user_id.as_str())
}
