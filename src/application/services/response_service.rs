use super::mutation_queue::{FlushObserver, MutationQueue};
use super::provenance::ProvenanceTracker;
use super::session_service::SharedIdentity;
use crate::application::ports::ResponseGateway;
use crate::domain::entities::{FlushReport, MutationAction, RespondPayload, ResponseRecord};
use crate::domain::history;
use crate::domain::value_objects::{
    ActionId, EventId, InitialResponse, RecordId, ResponseValue, UserId,
};
use crate::infrastructure::cache::ResponseLedger;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct TrackedRecord {
    user_id: UserId,
    record: ResponseRecord,
}

/// 送信確定前の楽観的レコードを追跡し、失敗時に台帳から取り除く
pub struct OptimisticTracker {
    ledger: Arc<ResponseLedger>,
    pending: RwLock<HashMap<ActionId, TrackedRecord>>,
}

impl OptimisticTracker {
    pub fn new(ledger: Arc<ResponseLedger>) -> Self {
        Self {
            ledger,
            pending: RwLock::new(HashMap::new()),
        }
    }

    async fn track(&self, action_id: ActionId, user_id: UserId, record: ResponseRecord) {
        self.pending
            .write()
            .await
            .insert(action_id, TrackedRecord { user_id, record });
    }

    /// 指定ユーザーの未確定レコード
    pub async fn pending_for(&self, user_id: &UserId) -> Vec<ResponseRecord> {
        self.pending
            .read()
            .await
            .values()
            .filter(|tracked| &tracked.user_id == user_id)
            .map(|tracked| tracked.record.clone())
            .collect()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    /// 楽観的レコードを取り消す
    pub async fn rollback(&self, action_id: &ActionId) -> Option<ResponseRecord> {
        let tracked = self.pending.write().await.remove(action_id)?;
        self.ledger
            .remove_record(&tracked.user_id, &tracked.record.id)
            .await;
        info!(
            "rolled back optimistic response {} for event {}",
            tracked.record.id, tracked.record.event_id
        );
        Some(tracked.record)
    }
}

#[async_trait]
impl FlushObserver for OptimisticTracker {
    async fn on_flush(&self, report: &FlushReport) {
        {
            let mut pending = self.pending.write().await;
            for action in &report.confirmed {
                pending.remove(&action.id);
            }
        }
        for action in &report.failed {
            self.rollback(&action.id).await;
        }
    }
}

/// 応答の読み取りと楽観的な書き込みを提供する
pub struct ResponseService {
    gateway: Arc<dyn ResponseGateway>,
    ledger: Arc<ResponseLedger>,
    queue: MutationQueue,
    identity: SharedIdentity,
    tracker: Arc<OptimisticTracker>,
    provenance: Arc<ProvenanceTracker>,
}

impl ResponseService {
    pub fn new(
        gateway: Arc<dyn ResponseGateway>,
        ledger: Arc<ResponseLedger>,
        queue: MutationQueue,
        identity: SharedIdentity,
        provenance: Arc<ProvenanceTracker>,
    ) -> Self {
        let tracker = Arc::new(OptimisticTracker::new(Arc::clone(&ledger)));
        queue.subscribe(tracker.clone());
        Self {
            gateway,
            ledger,
            queue,
            identity,
            tracker,
            provenance,
        }
    }

    pub fn tracker(&self) -> Arc<OptimisticTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn provenance(&self) -> Arc<ProvenanceTracker> {
        Arc::clone(&self.provenance)
    }

    async fn current_user(&self) -> UserId {
        self.identity.read().await.user_id().clone()
    }

    /// 応答を変更する。台帳への追記はネットワーク待ちより前に終わる。
    pub async fn respond(
        &self,
        event_id: EventId,
        value: Option<ResponseValue>,
    ) -> Result<ResponseRecord, AppError> {
        let user_id = self.current_user().await;
        let view = self.local_view(&user_id).await;
        let prior = history::latest(&view, &user_id, &event_id);
        let mark = self.provenance.get(&event_id).await;

        // 既存レコードがあればそれを優先し、無ければ到達経路を記録する
        let initial_response = match prior {
            Some(record) => record.final_response.map(InitialResponse::Prior),
            None => mark.as_ref().map(|m| InitialResponse::Provenance(m.provenance)),
        };

        let mut created_at = Utc::now();
        if let Some(record) = prior
            && created_at <= record.created_at
        {
            created_at = record.created_at + Duration::milliseconds(1);
        }

        let record = ResponseRecord::new(
            RecordId::local(),
            user_id.clone(),
            event_id.clone(),
            initial_response,
            value,
            created_at,
        )
        .with_inviter(mark.and_then(|m| m.invited_by));

        self.ledger.append(&user_id, record.clone()).await;

        let action = MutationAction::respond(
            user_id.clone(),
            RespondPayload {
                event_id,
                response: value,
                record_id: record.id.clone(),
            },
        );
        self.tracker
            .track(action.id.clone(), user_id, record.clone())
            .await;
        let action_id = self.queue.enqueue(action);
        debug!("optimistic response {} queued as {}", record.id, action_id);

        Ok(record)
    }

    /// 現在ユーザーの履歴（台帳になければ取得して格納）
    pub async fn history(&self) -> Result<Vec<ResponseRecord>, AppError> {
        let user_id = self.current_user().await;
        self.history_for(&user_id).await
    }

    pub async fn history_for(&self, user_id: &UserId) -> Result<Vec<ResponseRecord>, AppError> {
        let pending = self.tracker.pending_for(user_id).await;

        if let Some(records) = self.ledger.get(user_id).await {
            return Ok(history::merge(&records, &pending));
        }

        debug!("ledger miss for {user_id}, fetching history");
        let fetched = self.gateway.fetch_responses(user_id).await?;
        self.ledger.set(user_id, fetched).await;
        // 取得中に追記された楽観的レコードも戻す
        let pending = self.tracker.pending_for(user_id).await;
        self.ledger.merge(user_id, &pending).await;

        Ok(self.ledger.peek(user_id).await)
    }

    /// ネットワークを使わずに手元の台帳から読む
    pub async fn local_view(&self, user_id: &UserId) -> Vec<ResponseRecord> {
        let records = self.ledger.peek(user_id).await;
        let pending = self.tracker.pending_for(user_id).await;
        history::merge(&records, &pending)
    }

    /// 台帳経由で読む。取得に失敗したら手元のレコードで答える。
    async fn view(&self, user_id: &UserId) -> Vec<ResponseRecord> {
        match self.history_for(user_id).await {
            Ok(records) => records,
            Err(e) => {
                warn!("history fetch for {user_id} failed, answering from local records: {e}");
                self.local_view(user_id).await
            }
        }
    }

    pub async fn current_value(&self, event_id: &EventId) -> Option<ResponseValue> {
        let user_id = self.current_user().await;
        let view = self.view(&user_id).await;
        history::current_value(&view, &user_id, event_id)
    }

    pub async fn latest(&self, event_id: &EventId) -> Option<ResponseRecord> {
        let user_id = self.current_user().await;
        let view = self.view(&user_id).await;
        history::latest(&view, &user_id, event_id).cloned()
    }

    pub async fn latest_for(
        &self,
        user_id: &UserId,
        event_id: &EventId,
    ) -> Result<Option<ResponseRecord>, AppError> {
        let records = self.history_for(user_id).await?;
        Ok(history::latest(&records, user_id, event_id).cloned())
    }

    /// イベントごとの最新応答（一覧表示用）
    pub async fn my_responses(&self) -> Result<HashMap<EventId, ResponseRecord>, AppError> {
        let user_id = self.current_user().await;
        let records = self.history_for(&user_id).await?;
        Ok(history::group_latest_by_event(&records, &user_id)
            .into_iter()
            .map(|(event_id, record)| (event_id, record.clone()))
            .collect())
    }

    /// 渡された履歴からイベント参加者ごとの最新応答をまとめる
    pub fn event_responses(
        records: &[ResponseRecord],
        event_id: &EventId,
    ) -> HashMap<UserId, ResponseRecord> {
        history::group_latest_by_user(records, event_id)
            .into_iter()
            .map(|(user_id, record)| (user_id, record.clone()))
            .collect()
    }

    /// 特定アクションの失敗が確定したときの取り消し
    pub async fn rollback(&self, action_id: &ActionId) -> Option<ResponseRecord> {
        let record = self.tracker.rollback(action_id).await;
        if record.is_none() {
            warn!("no optimistic response tracked for action {action_id}");
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{BatchRequest, BatchResponse, MigrationRequest, MigrationResponse};
    use crate::domain::value_objects::{Identity, Provenance};
    use crate::infrastructure::cache::ReadThroughCache;
    use crate::shared::config::SyncConfig;
    use chrono::TimeZone;
    use mockall::mock;

    mock! {
        pub Gateway {}

        #[async_trait]
        impl ResponseGateway for Gateway {
            async fn fetch_responses(&self, user_id: &UserId) -> Result<Vec<ResponseRecord>, AppError>;
            async fn submit_batch(&self, request: BatchRequest) -> Result<BatchResponse, AppError>;
            async fn migrate_responses(&self, request: MigrationRequest) -> Result<MigrationResponse, AppError>;
        }
    }

    struct Fixture {
        service: ResponseService,
        queue: MutationQueue,
        ledger: Arc<ResponseLedger>,
    }

    fn user() -> UserId {
        UserId::parse("visit-1").unwrap()
    }

    fn event() -> EventId {
        EventId::parse("evt-42").unwrap()
    }

    fn build(gateway: MockGateway) -> Fixture {
        let gateway: Arc<dyn ResponseGateway> = Arc::new(gateway);
        let ledger = Arc::new(ResponseLedger::new());
        let queue = MutationQueue::new(
            Arc::clone(&gateway),
            Arc::new(ReadThroughCache::new(std::time::Duration::from_secs(120))),
            Arc::clone(&ledger),
            &SyncConfig::default(),
        );
        let identity = Arc::new(RwLock::new(Identity::Anonymous(user())));
        let service = ResponseService::new(
            gateway,
            Arc::clone(&ledger),
            queue.clone(),
            identity,
            Arc::new(ProvenanceTracker::new()),
        );
        Fixture {
            service,
            queue,
            ledger,
        }
    }

    fn server_record(id: &str, value: ResponseValue, secs: i64) -> ResponseRecord {
        ResponseRecord::new(
            RecordId::parse(id).unwrap(),
            user(),
            event(),
            None,
            Some(value),
            Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        )
    }

    fn ok_batch(request: BatchRequest) -> Result<BatchResponse, AppError> {
        Ok(BatchResponse {
            success: true,
            processed: request.actions.len() as u32,
            results: vec![],
        })
    }

    #[tokio::test]
    async fn respond_appends_locally_and_reads_merge_it() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch_responses()
            .times(1)
            .returning(|_| Ok(vec![]));
        let fixture = build(gateway);

        let record = fixture
            .service
            .respond(event(), Some(ResponseValue::Interested))
            .await
            .unwrap();

        assert!(record.is_optimistic());
        assert_eq!(record.initial_response, None);
        assert_eq!(
            fixture.service.current_value(&event()).await,
            Some(ResponseValue::Interested)
        );
        assert_eq!(fixture.ledger.peek(&user()).await.len(), 1);
        assert_eq!(fixture.queue.pending_len(), 1);
    }

    #[tokio::test]
    async fn initial_response_uses_prior_value_over_provenance() {
        let fixture = build(MockGateway::new());
        fixture
            .ledger
            .set(&user(), vec![server_record("srv-1", ResponseValue::Maybe, 0)])
            .await;
        fixture
            .service
            .provenance()
            .record_link_arrival(event())
            .await;

        let record = fixture
            .service
            .respond(event(), Some(ResponseValue::Going))
            .await
            .unwrap();

        assert_eq!(
            record.initial_response,
            Some(InitialResponse::Prior(ResponseValue::Maybe))
        );
    }

    #[tokio::test]
    async fn provenance_fills_initial_response_without_prior_record() {
        let fixture = build(MockGateway::new());
        let inviter = UserId::parse("user-3").unwrap();
        fixture
            .service
            .provenance()
            .record_invitation(event(), inviter.clone())
            .await;

        let record = fixture
            .service
            .respond(event(), Some(ResponseValue::Going))
            .await
            .unwrap();

        assert_eq!(
            record.initial_response,
            Some(InitialResponse::Provenance(Provenance::Invited))
        );
        assert_eq!(record.invited_by_user_id, Some(inviter));
    }

    #[tokio::test]
    async fn created_at_advances_past_a_future_dated_record() {
        let fixture = build(MockGateway::new());
        let mut future = server_record("srv-1", ResponseValue::Maybe, 0);
        future.created_at = Utc::now() + Duration::hours(1);
        fixture.ledger.set(&user(), vec![future.clone()]).await;

        let record = fixture
            .service
            .respond(event(), Some(ResponseValue::NotThere))
            .await
            .unwrap();

        assert!(record.created_at > future.created_at);
        assert_eq!(
            fixture.service.current_value(&event()).await,
            Some(ResponseValue::NotThere)
        );
    }

    #[tokio::test]
    async fn history_refetch_keeps_unconfirmed_responses() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch_responses()
            .times(1)
            .returning(|_| Ok(vec![server_record("srv-1", ResponseValue::Maybe, 0)]));
        let fixture = build(gateway);

        fixture
            .service
            .respond(event(), Some(ResponseValue::Going))
            .await
            .unwrap();
        let history = fixture.service.history().await.unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(
            history::current_value(&history, &user(), &event()),
            Some(ResponseValue::Going)
        );

        // 2 回目は台帳から
        assert_eq!(fixture.service.history().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_flush_rolls_back_the_optimistic_record() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_submit_batch()
            .times(1)
            .returning(|_| Err(AppError::Network("503".into())));
        gateway.expect_fetch_responses().returning(|_| Ok(vec![]));
        let fixture = build(gateway);

        fixture
            .service
            .respond(event(), Some(ResponseValue::Going))
            .await
            .unwrap();
        let reports = fixture.queue.flush_now().await;

        assert_eq!(reports[0].failed.len(), 1);
        assert_eq!(fixture.service.current_value(&event()).await, None);
        assert!(fixture.ledger.peek(&user()).await.is_empty());
        assert_eq!(fixture.service.tracker().pending_count().await, 0);
    }

    #[tokio::test]
    async fn partial_failure_only_reverts_rejected_actions() {
        let mut gateway = MockGateway::new();
        gateway.expect_submit_batch().times(1).returning(|request| {
            let results = request
                .actions
                .iter()
                .enumerate()
                .map(|(index, action)| crate::domain::entities::ActionResult {
                    action_id: action.id.clone(),
                    success: index == 0,
                    error: (index != 0).then(|| "event closed".to_string()),
                })
                .collect();
            Ok(BatchResponse {
                success: false,
                processed: 1,
                results,
            })
        });
        gateway.expect_fetch_responses().returning(|_| Ok(vec![]));
        let fixture = build(gateway);
        let other_event = EventId::parse("evt-7").unwrap();

        fixture
            .service
            .respond(event(), Some(ResponseValue::Going))
            .await
            .unwrap();
        let rejected = fixture
            .service
            .respond(other_event.clone(), Some(ResponseValue::Seen))
            .await
            .unwrap();

        let reports = fixture.queue.flush_now().await;
        assert_eq!(reports[0].confirmed.len(), 1);
        assert_eq!(reports[0].failed.len(), 1);

        let view = fixture.service.local_view(&user()).await;
        assert!(view.iter().all(|record| record.id != rejected.id));
        assert_eq!(fixture.service.current_value(&other_event).await, None);
    }

    #[tokio::test]
    async fn confirmed_answer_stays_visible_when_refetch_fails() {
        let mut gateway = MockGateway::new();
        gateway.expect_submit_batch().times(1).returning(ok_batch);
        gateway
            .expect_fetch_responses()
            .returning(|_| Err(AppError::Network("offline".into())));
        let fixture = build(gateway);

        let first = fixture
            .service
            .respond(event(), Some(ResponseValue::Interested))
            .await
            .unwrap();
        let reports = fixture.queue.flush_now().await;
        assert_eq!(reports[0].confirmed.len(), 1);
        assert_eq!(fixture.service.tracker().pending_count().await, 0);
        assert!(!fixture.ledger.is_hydrated(&user()).await);

        assert_eq!(
            fixture.service.current_value(&event()).await,
            Some(ResponseValue::Interested)
        );
        assert_eq!(
            fixture.service.latest(&event()).await.map(|r| r.id),
            Some(first.id.clone())
        );

        let second = fixture
            .service
            .respond(event(), Some(ResponseValue::Going))
            .await
            .unwrap();
        assert_eq!(
            second.initial_response,
            Some(InitialResponse::Prior(ResponseValue::Interested))
        );
        assert!(second.created_at > first.created_at);
    }

    #[tokio::test]
    async fn confirmed_answer_is_replaced_by_the_server_copy_on_refetch() {
        let mut gateway = MockGateway::new();
        gateway.expect_submit_batch().times(1).returning(ok_batch);
        let fixture = build(gateway);

        let local = fixture
            .service
            .respond(event(), Some(ResponseValue::Interested))
            .await
            .unwrap();
        fixture.queue.flush_now().await;

        let mut server_copy = local.clone();
        server_copy.id = RecordId::parse("srv-9").unwrap();
        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch_responses()
            .times(1)
            .returning(move |_| Ok(vec![server_copy.clone()]));
        // 同じ台帳を別のゲートウェイで読み直す
        let reader = ResponseService::new(
            Arc::new(gateway),
            Arc::clone(&fixture.ledger),
            fixture.queue.clone(),
            Arc::new(RwLock::new(Identity::Anonymous(user()))),
            Arc::new(ProvenanceTracker::new()),
        );

        let latest = reader.latest(&event()).await.unwrap();
        assert_eq!(latest.id.as_str(), "srv-9");
        assert_eq!(latest.final_response, Some(ResponseValue::Interested));
        assert_eq!(fixture.ledger.peek(&user()).await.len(), 1);
    }

    #[test]
    fn event_responses_groups_by_user() {
        let mut other = server_record("srv-2", ResponseValue::Going, 5);
        other.user_id = UserId::parse("user-2").unwrap();
        let records = vec![
            server_record("srv-1", ResponseValue::Maybe, 0),
            server_record("srv-3", ResponseValue::Cleared, 9),
            other,
        ];

        let grouped = ResponseService::event_responses(&records, &event());
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&user()].final_response, Some(ResponseValue::Cleared));
    }
}
