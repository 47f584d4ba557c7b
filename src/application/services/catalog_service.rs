use crate::application::ports::CatalogGateway;
use crate::domain::value_objects::{EventId, UserId};
use crate::infrastructure::cache::{CacheKey, ReadThroughCache};
use crate::shared::error::AppError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// イベント・フレンド一覧の読み取り（キャッシュ経由）
pub struct CatalogService {
    gateway: Arc<dyn CatalogGateway>,
    cache: Arc<ReadThroughCache>,
}

impl CatalogService {
    pub fn new(gateway: Arc<dyn CatalogGateway>, cache: Arc<ReadThroughCache>) -> Self {
        Self { gateway, cache }
    }

    pub async fn events(&self) -> Result<Vec<Value>, AppError> {
        self.read_through(CacheKey::all_events(), || self.gateway.fetch_events())
            .await
    }

    pub async fn my_events(&self, user_id: &UserId) -> Result<Vec<Value>, AppError> {
        self.read_through(CacheKey::my_events(user_id), || {
            self.gateway.fetch_my_events(user_id)
        })
        .await
    }

    pub async fn event(&self, event_id: &EventId) -> Result<Value, AppError> {
        self.read_through(CacheKey::event(event_id), || {
            self.gateway.fetch_event(event_id)
        })
        .await
    }

    pub async fn friends(&self, user_id: &UserId) -> Result<Vec<Value>, AppError> {
        self.read_through(CacheKey::friends(user_id), || {
            self.gateway.fetch_friends(user_id)
        })
        .await
    }

    /// 作成・更新後にイベント系キーを消す
    pub async fn save_event(&self, body: Value) -> Result<Value, AppError> {
        let saved = self.gateway.save_event(body).await?;

        self.cache.delete(&CacheKey::all_events()).await;
        if let Some(id) = saved.get("id").and_then(Value::as_str) {
            match EventId::parse(id) {
                Ok(event_id) => self.cache.delete(&CacheKey::event(&event_id)).await,
                Err(e) => warn!("saved event has invalid id: {e}"),
            }
        }
        if let Some(owner) = saved.get("userId").and_then(Value::as_str)
            && let Ok(user_id) = UserId::parse(owner)
        {
            self.cache.delete(&CacheKey::my_events(&user_id)).await;
        }
        Ok(saved)
    }

    async fn read_through<T, F, Fut>(&self, key: String, fetch: F) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        if let Some(cached) = self.cache.get::<T>(&key).await {
            return Ok(cached);
        }

        debug!("cache miss: {key}");
        let value = fetch().await?;
        self.cache.set(&key, &value).await?;
        Ok(value)
    }
}
