use crate::shared::error::AppError;
use async_trait::async_trait;

/// 文字列キー・値のローカルストア（永続用とセッション用の両方に使う）
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
    async fn remove(&self, key: &str) -> Result<(), AppError>;
    async fn keys(&self) -> Result<Vec<String>, AppError>;
}
