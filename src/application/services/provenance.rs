use crate::domain::value_objects::{EventId, Provenance, UserId};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceMark {
    pub provenance: Provenance,
    pub invited_by: Option<UserId>,
}

/// イベントに共有リンク・招待経由で到達したことを覚えておく
#[derive(Default)]
pub struct ProvenanceTracker {
    marks: RwLock<HashMap<EventId, ProvenanceMark>>,
}

impl ProvenanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_link_arrival(&self, event_id: EventId) {
        let mut marks = self.marks.write().await;
        // 招待の方が情報量が多いので上書きしない
        marks.entry(event_id).or_insert(ProvenanceMark {
            provenance: Provenance::Linked,
            invited_by: None,
        });
    }

    pub async fn record_invitation(&self, event_id: EventId, inviter: UserId) {
        let mut marks = self.marks.write().await;
        marks.insert(
            event_id,
            ProvenanceMark {
                provenance: Provenance::Invited,
                invited_by: Some(inviter),
            },
        );
    }

    pub async fn get(&self, event_id: &EventId) -> Option<ProvenanceMark> {
        self.marks.read().await.get(event_id).cloned()
    }

    pub async fn clear(&self) {
        self.marks.write().await.clear();
    }
}
