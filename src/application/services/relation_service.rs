use super::mutation_queue::{FlushObserver, MutationQueue};
use super::session_service::SharedIdentity;
use crate::domain::entities::{FlushReport, MutationAction, MutationKind, RelationPayload};
use crate::domain::value_objects::{ActionId, RelationId, UserId};
use crate::infrastructure::cache::{CacheKey, ReadThroughCache};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// 確定した関係操作について、双方のフレンド一覧キャッシュを消す
pub struct RelationCacheInvalidator {
    cache: Arc<ReadThroughCache>,
}

impl RelationCacheInvalidator {
    pub fn new(cache: Arc<ReadThroughCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl FlushObserver for RelationCacheInvalidator {
    async fn on_flush(&self, report: &FlushReport) {
        for action in &report.confirmed {
            let Some(payload) = action.kind.relation() else {
                continue;
            };
            self.cache.delete(&CacheKey::friends(&action.user_id)).await;
            self.cache
                .delete(&CacheKey::friends(&payload.counterpart_id))
                .await;
            debug!(
                "relation {} settled, friends cache dropped for {} and {}",
                payload.relation_id, action.user_id, payload.counterpart_id
            );
        }
    }
}

/// フレンド関係の承認・ブロック・削除
pub struct RelationService {
    queue: MutationQueue,
    identity: SharedIdentity,
}

impl RelationService {
    pub fn new(
        queue: MutationQueue,
        identity: SharedIdentity,
        cache: Arc<ReadThroughCache>,
    ) -> Self {
        queue.subscribe(Arc::new(RelationCacheInvalidator::new(cache)));
        Self { queue, identity }
    }

    pub async fn accept(&self, relation_id: RelationId, counterpart_id: UserId) -> ActionId {
        self.enqueue(MutationKind::AcceptRelation(RelationPayload {
            relation_id,
            counterpart_id,
        }))
        .await
    }

    pub async fn block(&self, relation_id: RelationId, counterpart_id: UserId) -> ActionId {
        self.enqueue(MutationKind::BlockRelation(RelationPayload {
            relation_id,
            counterpart_id,
        }))
        .await
    }

    pub async fn remove(&self, relation_id: RelationId, counterpart_id: UserId) -> ActionId {
        self.enqueue(MutationKind::RemoveRelation(RelationPayload {
            relation_id,
            counterpart_id,
        }))
        .await
    }

    async fn enqueue(&self, kind: MutationKind) -> ActionId {
        let user_id = self.identity.read().await.user_id().clone();
        self.queue.enqueue(MutationAction::new(kind, user_id))
    }
}
