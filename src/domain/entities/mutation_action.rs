use crate::domain::value_objects::{ActionId, EventId, RecordId, RelationId, ResponseValue, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondPayload {
    pub event_id: EventId,
    pub response: Option<ResponseValue>,
    pub record_id: RecordId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationPayload {
    pub relation_id: RelationId,
    pub counterpart_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum MutationKind {
    RespondToEvent(RespondPayload),
    AcceptRelation(RelationPayload),
    BlockRelation(RelationPayload),
    RemoveRelation(RelationPayload),
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::RespondToEvent(_) => "respond-to-event",
            MutationKind::AcceptRelation(_) => "accept-relation",
            MutationKind::BlockRelation(_) => "block-relation",
            MutationKind::RemoveRelation(_) => "remove-relation",
        }
    }

    pub fn relation(&self) -> Option<&RelationPayload> {
        match self {
            MutationKind::RespondToEvent(_) => None,
            MutationKind::AcceptRelation(payload)
            | MutationKind::BlockRelation(payload)
            | MutationKind::RemoveRelation(payload) => Some(payload),
        }
    }
}

/// 送信待ちキューに載るユーザー操作
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationAction {
    pub id: ActionId,
    #[serde(flatten)]
    pub kind: MutationKind,
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
    /// このアクションを含んだ送信の回数（ローカルのみ）
    #[serde(skip)]
    pub attempt: u32,
}

impl MutationAction {
    pub fn new(kind: MutationKind, user_id: UserId) -> Self {
        Self {
            id: ActionId::generate(),
            kind,
            user_id,
            timestamp: Utc::now(),
            attempt: 0,
        }
    }

    pub fn respond(user_id: UserId, payload: RespondPayload) -> Self {
        Self::new(MutationKind::RespondToEvent(payload), user_id)
    }
}
