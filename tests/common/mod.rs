pub mod mocks;

use mocks::InMemoryRemote;
use rsvp_sync_lib::AppState;
use rsvp_sync_lib::application::ports::KeyValueStore;
use rsvp_sync_lib::infrastructure::storage::MemoryKeyValueStore;
use rsvp_sync_lib::shared::config::AppConfig;
use std::sync::Arc;

#[allow(dead_code)]
pub struct TestContext {
    pub state: AppState,
    pub remote: Arc<InMemoryRemote>,
    pub durable: Arc<MemoryKeyValueStore>,
    pub session: Arc<MemoryKeyValueStore>,
}

/// `visit_id` を訪問者 ID としてセッションに置いた状態で組み立てる
pub async fn setup_with_visitor(visit_id: &str) -> TestContext {
    let remote = Arc::new(InMemoryRemote::new());
    let durable = Arc::new(MemoryKeyValueStore::new());
    let session = Arc::new(MemoryKeyValueStore::new());
    session
        .set("visit-user-id", visit_id)
        .await
        .expect("seed visitor id");

    let state = AppState::from_parts(
        AppConfig::default(),
        remote.clone(),
        remote.clone(),
        durable.clone(),
        session.clone(),
    )
    .await
    .expect("app state");

    TestContext {
        state,
        remote,
        durable,
        session,
    }
}
