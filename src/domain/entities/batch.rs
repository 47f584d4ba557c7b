use super::mutation_action::MutationAction;
use crate::domain::value_objects::{ActionId, UserId};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `PUT /batch` のリクエストボディ
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub actions: Vec<MutationAction>,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub action_id: ActionId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub success: bool,
    #[serde(default)]
    pub processed: u32,
    #[serde(default)]
    pub results: Vec<ActionResult>,
}

impl BatchResponse {
    /// アクション単位の結果。個別結果が無ければバッチ全体の成否を使う。
    pub fn succeeded(&self, action_id: &ActionId) -> bool {
        self.results
            .iter()
            .find(|result| &result.action_id == action_id)
            .map(|result| result.success)
            .unwrap_or(self.success)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRequest {
    pub source_user_id: UserId,
    pub target_user_id: UserId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationData {
    #[serde(default)]
    pub responses_migrated: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Option<MigrationData>,
}

impl MigrationResponse {
    pub fn responses_migrated(&self) -> u32 {
        self.data
            .as_ref()
            .map(|data| data.responses_migrated)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FlushError {
    #[error("batch request failed: {0}")]
    Transport(AppError),
    #[error("server rejected {failed} of {total} actions")]
    Rejected { failed: usize, total: usize },
}

/// ユーザー単位のバッチ送信結果
#[derive(Debug, Clone)]
pub struct FlushReport {
    pub user_id: UserId,
    /// サーバーが受理したアクション
    pub confirmed: Vec<MutationAction>,
    /// 再送のためキュー先頭へ戻したアクション
    pub requeued: Vec<MutationAction>,
    /// 試行回数を使い切って確定的に失敗したアクション
    pub failed: Vec<MutationAction>,
    pub result: Result<u32, FlushError>,
    pub settled_at: DateTime<Utc>,
}

impl FlushReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn total(&self) -> usize {
        self.confirmed.len() + self.requeued.len() + self.failed.len()
    }
}
