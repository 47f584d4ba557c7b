use crate::domain::entities::{
    BatchRequest, BatchResponse, MigrationRequest, MigrationResponse, ResponseRecord,
};
use crate::domain::value_objects::UserId;
use crate::shared::error::AppError;
use async_trait::async_trait;

/// 応答履歴を保持するリモートストアへの窓口
#[async_trait]
pub trait ResponseGateway: Send + Sync {
    /// `GET /responses?userId=`
    async fn fetch_responses(&self, user_id: &UserId) -> Result<Vec<ResponseRecord>, AppError>;

    /// `PUT /batch`
    async fn submit_batch(&self, request: BatchRequest) -> Result<BatchResponse, AppError>;

    /// `POST /users/migrate-responses`
    async fn migrate_responses(
        &self,
        request: MigrationRequest,
    ) -> Result<MigrationResponse, AppError>;
}
