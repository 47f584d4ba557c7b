use crate::domain::value_objects::{EventId, UserId};
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde_json::Value;

/// イベント・フレンド一覧の取得元。中身は不透明な JSON として扱う。
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    async fn fetch_events(&self) -> Result<Vec<Value>, AppError>;
    async fn fetch_my_events(&self, user_id: &UserId) -> Result<Vec<Value>, AppError>;
    async fn fetch_event(&self, event_id: &EventId) -> Result<Value, AppError>;
    /// 作成・更新どちらも `POST /events`
    async fn save_event(&self, body: Value) -> Result<Value, AppError>;
    async fn fetch_friends(&self, user_id: &UserId) -> Result<Vec<Value>, AppError>;
}
