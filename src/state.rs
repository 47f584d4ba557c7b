use crate::application::ports::{CatalogGateway, KeyValueStore, ResponseGateway};
use crate::application::services::{
    CatalogService, IdentityReconciler, MutationQueue, ProvenanceTracker, ReconcileOutcome,
    RelationService, ResponseService, SessionService,
};
use crate::domain::entities::FlushReport;
use crate::domain::value_objects::{Identity, UserId};
use crate::infrastructure::cache::{ReadThroughCache, ResponseLedger};
use crate::infrastructure::http::ApiClient;
use crate::infrastructure::storage::{FileKeyValueStore, MemoryKeyValueStore};
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

pub const DURABLE_STORE_FILE: &str = "local-storage.json";
pub const SESSION_STORE_FILE: &str = "session-storage.json";

/// アプリケーション全体の状態。キャッシュ・台帳・キューはここで 1 つだけ作る。
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub cache: Arc<ReadThroughCache>,
    pub ledger: Arc<ResponseLedger>,
    pub queue: MutationQueue,
    pub session: Arc<SessionService>,
    pub responses: Arc<ResponseService>,
    pub relations: Arc<RelationService>,
    pub catalog: Arc<CatalogService>,
    pub reconciler: Arc<IdentityReconciler>,
}

impl AppState {
    /// HTTP クライアントとファイル永続ストアで組み立てる
    pub async fn new(config: AppConfig) -> Result<Self, AppError> {
        config.validate().map_err(AppError::ConfigurationError)?;

        let api = Arc::new(ApiClient::new(&config.api)?);
        let durable = FileKeyValueStore::open(
            Path::new(&config.storage.data_dir).join(DURABLE_STORE_FILE),
        )
        .await?;

        Self::from_parts(
            config,
            api.clone(),
            api,
            Arc::new(durable),
            Arc::new(MemoryKeyValueStore::new()),
        )
        .await
    }

    pub async fn from_parts(
        config: AppConfig,
        responses_gateway: Arc<dyn ResponseGateway>,
        catalog_gateway: Arc<dyn CatalogGateway>,
        durable: Arc<dyn KeyValueStore>,
        session_store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, AppError> {
        let cache = Arc::new(ReadThroughCache::new(config.cache.ttl()));
        let ledger = Arc::new(ResponseLedger::new());
        let queue = MutationQueue::new(
            Arc::clone(&responses_gateway),
            Arc::clone(&cache),
            Arc::clone(&ledger),
            &config.sync,
        );

        let session = Arc::new(SessionService::new(durable, session_store));
        let identity = session.restore().await?;
        info!("session restored as {identity}");

        let responses = Arc::new(ResponseService::new(
            Arc::clone(&responses_gateway),
            Arc::clone(&ledger),
            queue.clone(),
            session.identity_handle(),
            Arc::new(ProvenanceTracker::new()),
        ));
        let relations = Arc::new(RelationService::new(
            queue.clone(),
            session.identity_handle(),
            Arc::clone(&cache),
        ));
        let catalog = Arc::new(CatalogService::new(catalog_gateway, Arc::clone(&cache)));
        let reconciler = Arc::new(IdentityReconciler::new(
            responses_gateway,
            queue.clone(),
            Arc::clone(&cache),
            Arc::clone(&ledger),
            Arc::clone(&session),
        ));

        Ok(Self {
            config: Arc::new(config),
            cache,
            ledger,
            queue,
            session,
            responses,
            relations,
            catalog,
            reconciler,
        })
    }

    pub async fn identity(&self) -> Identity {
        self.session.current().await
    }

    /// ログイン。匿名で記録した応答があれば付け替える。
    pub async fn login(&self, user_id: UserId) -> Result<ReconcileOutcome, AppError> {
        match self.session.current().await {
            Identity::Anonymous(source) => self.reconciler.reconcile(&source, &user_id).await,
            Identity::Authenticated(current) => {
                // 認証済みアカウント同士では移行しない
                if current != user_id {
                    self.queue.flush_now().await;
                    self.session.authenticate(user_id).await?;
                }
                Ok(ReconcileOutcome::NothingToMigrate)
            }
        }
    }

    pub async fn logout(&self) -> Result<Identity, AppError> {
        self.queue.flush_now().await;
        self.cache.clear().await;
        self.ledger.clear().await;
        self.responses.provenance().clear().await;
        self.session.logout().await
    }

    /// ページ離脱時のフック。待たずに送信を開始する。
    pub fn on_page_hide(&self) -> Option<JoinHandle<Vec<FlushReport>>> {
        self.queue.flush_on_exit()
    }

    /// 終了前に未送信の操作を送り切る
    pub async fn shutdown(&self) -> Vec<FlushReport> {
        let reports = self.queue.flush_now().await;
        if !reports.is_empty() {
            info!("flushed {} batches before shutdown", reports.len());
        }
        reports
    }
}
