use crate::domain::value_objects::{EventId, InitialResponse, RecordId, ResponseValue, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use tracing::warn;

/// 応答履歴の 1 行。追記のみで、既存レコードは書き換えない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    pub id: RecordId,
    pub user_id: UserId,
    pub event_id: EventId,
    #[serde(default, deserialize_with = "deserialize_initial_response")]
    pub initial_response: Option<InitialResponse>,
    #[serde(default, deserialize_with = "deserialize_final_response")]
    pub final_response: Option<ResponseValue>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invited_by_user_id: Option<UserId>,
}

impl ResponseRecord {
    pub fn new(
        id: RecordId,
        user_id: UserId,
        event_id: EventId,
        initial_response: Option<InitialResponse>,
        final_response: Option<ResponseValue>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            event_id,
            initial_response,
            final_response,
            created_at,
            invited_by_user_id: None,
        }
    }

    pub fn with_inviter(mut self, inviter: Option<UserId>) -> Self {
        self.invited_by_user_id = inviter;
        self
    }

    pub fn is_optimistic(&self) -> bool {
        self.id.is_local()
    }

    pub fn concerns(&self, user_id: &UserId, event_id: &EventId) -> bool {
        &self.user_id == user_id && &self.event_id == event_id
    }

    /// 最新判定の比較順序: `created_at`、同時刻なら `id`
    pub fn cmp_recency(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// `null`・`"none"`・未知の文字列はすべて `None`。未知の値は警告して捨てる。
fn deserialize_initial_response<'de, D>(deserializer: D) -> Result<Option<InitialResponse>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let parsed = InitialResponse::from_wire(&raw);
    if parsed.is_none() && !raw.trim().eq_ignore_ascii_case("none") {
        warn!("ignoring unknown initialResponse value: {raw}");
    }
    Ok(parsed)
}

/// `null` と `"none"` は未回答。それ以外の未知の値はエラー。
fn deserialize_final_response<'de, D>(deserializer: D) -> Result<Option<ResponseValue>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().eq_ignore_ascii_case("none") => Ok(None),
        Some(raw) => raw
            .parse::<ResponseValue>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
