use async_trait::async_trait;
use rsvp_sync_lib::application::ports::{CatalogGateway, ResponseGateway};
use rsvp_sync_lib::domain::entities::{
    ActionResult, BatchRequest, BatchResponse, MigrationData, MigrationRequest,
    MigrationResponse, MutationKind, ResponseRecord,
};
use rsvp_sync_lib::domain::value_objects::{EventId, RecordId, UserId};
use rsvp_sync_lib::shared::error::AppError;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Default)]
struct RemoteState {
    records: Vec<ResponseRecord>,
    batches: Vec<BatchRequest>,
    migrations: Vec<MigrationRequest>,
    rejected_events: HashSet<EventId>,
    fetches: usize,
    next_id: u64,
}

/// 応答・カタログ API を再現するインメモリのサーバー
#[derive(Default)]
pub struct InMemoryRemote {
    state: Mutex<RemoteState>,
}

#[allow(dead_code)]
impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, record: ResponseRecord) {
        self.state.lock().unwrap().records.push(record);
    }

    /// このイベントへの応答をアクション単位で拒否する
    pub fn reject_event(&self, event_id: EventId) {
        self.state.lock().unwrap().rejected_events.insert(event_id);
    }

    pub fn batches(&self) -> Vec<BatchRequest> {
        self.state.lock().unwrap().batches.clone()
    }

    pub fn migrations(&self) -> Vec<MigrationRequest> {
        self.state.lock().unwrap().migrations.clone()
    }

    pub fn records_for(&self, user_id: &UserId) -> Vec<ResponseRecord> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|record| &record.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn fetches(&self) -> usize {
        self.state.lock().unwrap().fetches
    }
}

#[async_trait]
impl ResponseGateway for InMemoryRemote {
    async fn fetch_responses(&self, user_id: &UserId) -> Result<Vec<ResponseRecord>, AppError> {
        let mut state = self.state.lock().unwrap();
        state.fetches += 1;
        Ok(state
            .records
            .iter()
            .filter(|record| &record.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn submit_batch(&self, request: BatchRequest) -> Result<BatchResponse, AppError> {
        let mut state = self.state.lock().unwrap();
        state.batches.push(request.clone());

        let mut results = Vec::new();
        for action in &request.actions {
            let accepted = match &action.kind {
                MutationKind::RespondToEvent(payload) => {
                    if state.rejected_events.contains(&payload.event_id) {
                        false
                    } else {
                        state.next_id += 1;
                        let id = RecordId::parse(&format!("srv-{}", state.next_id)).unwrap();
                        state.records.push(ResponseRecord::new(
                            id,
                            action.user_id.clone(),
                            payload.event_id.clone(),
                            None,
                            payload.response,
                            action.timestamp,
                        ));
                        true
                    }
                }
                _ => true,
            };
            results.push(ActionResult {
                action_id: action.id.clone(),
                success: accepted,
                error: (!accepted).then(|| "rejected".to_string()),
            });
        }

        let processed = results.iter().filter(|result| result.success).count() as u32;
        Ok(BatchResponse {
            success: processed as usize == results.len(),
            processed,
            results,
        })
    }

    async fn migrate_responses(
        &self,
        request: MigrationRequest,
    ) -> Result<MigrationResponse, AppError> {
        let mut state = self.state.lock().unwrap();
        state.migrations.push(request.clone());

        let mut migrated = 0;
        for record in state
            .records
            .iter_mut()
            .filter(|record| record.user_id == request.source_user_id)
        {
            record.user_id = request.target_user_id.clone();
            migrated += 1;
        }
        Ok(MigrationResponse {
            success: true,
            data: Some(MigrationData {
                responses_migrated: migrated,
            }),
        })
    }
}

#[async_trait]
impl CatalogGateway for InMemoryRemote {
    async fn fetch_events(&self) -> Result<Vec<Value>, AppError> {
        Ok(vec![
            json!({"id": "evt-42", "title": "Rooftop screening", "userId": "user-3"}),
            json!({"id": "evt-7", "title": "Board games", "userId": "user-9"}),
        ])
    }

    async fn fetch_my_events(&self, user_id: &UserId) -> Result<Vec<Value>, AppError> {
        Ok(self
            .fetch_events()
            .await?
            .into_iter()
            .filter(|event| event["userId"] == user_id.as_str())
            .collect())
    }

    async fn fetch_event(&self, event_id: &EventId) -> Result<Value, AppError> {
        self.fetch_events()
            .await?
            .into_iter()
            .find(|event| event["id"] == event_id.as_str())
            .ok_or_else(|| AppError::NotFound(format!("event {event_id}")))
    }

    async fn save_event(&self, body: Value) -> Result<Value, AppError> {
        Ok(body)
    }

    async fn fetch_friends(&self, _user_id: &UserId) -> Result<Vec<Value>, AppError> {
        Ok(Vec::new())
    }
}
