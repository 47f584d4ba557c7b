use super::mutation_queue::MutationQueue;
use super::session_service::SessionService;
use crate::application::ports::ResponseGateway;
use crate::domain::entities::MigrationRequest;
use crate::domain::value_objects::UserId;
use crate::infrastructure::cache::{ReadThroughCache, ResponseLedger};
use crate::shared::error::AppError;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Migrated { responses_migrated: u32 },
    AlreadyReconciled,
    /// 移行元と移行先が同じ
    NothingToMigrate,
    /// 移行は失敗したがログインは続行した
    Failed(AppError),
}

/// 匿名 ID で記録した応答をログイン後の ID に付け替える
pub struct IdentityReconciler {
    gateway: Arc<dyn ResponseGateway>,
    queue: MutationQueue,
    cache: Arc<ReadThroughCache>,
    ledger: Arc<ResponseLedger>,
    session: Arc<SessionService>,
    // 同時ログインで 2 重に移行しないよう直列化
    running: Mutex<()>,
}

impl IdentityReconciler {
    pub fn new(
        gateway: Arc<dyn ResponseGateway>,
        queue: MutationQueue,
        cache: Arc<ReadThroughCache>,
        ledger: Arc<ResponseLedger>,
        session: Arc<SessionService>,
    ) -> Self {
        Self {
            gateway,
            queue,
            cache,
            ledger,
            session,
            running: Mutex::new(()),
        }
    }

    pub async fn reconcile(
        &self,
        source: &UserId,
        target: &UserId,
    ) -> Result<ReconcileOutcome, AppError> {
        let _guard = self.running.lock().await;

        if source == target {
            self.session.authenticate(target.clone()).await?;
            return Ok(ReconcileOutcome::NothingToMigrate);
        }

        if let Some(previous) = self.session.migration_target(source).await? {
            if &previous != target {
                warn!("{source} was already migrated to {previous}, not to {target}");
            }
            self.session.authenticate(target.clone()).await?;
            return Ok(ReconcileOutcome::AlreadyReconciled);
        }

        // 匿名のまま積まれた操作は移行元 ID で先に送る
        let reports = self.queue.flush_now().await;
        if reports.iter().any(|report| !report.is_success()) {
            warn!("some anonymous mutations did not settle before migration");
        }
        // 再送待ちで残ったものは移行後に孤立するので移行先 ID で送る
        let reassigned = self.queue.reassign_pending(source, target);
        if reassigned > 0 {
            info!("{reassigned} pending mutations will be sent as {target}");
        }

        let request = MigrationRequest {
            source_user_id: source.clone(),
            target_user_id: target.clone(),
        };
        let outcome = match self.gateway.migrate_responses(request).await {
            Ok(response) if response.success => {
                let migrated = response.responses_migrated();
                self.session.clear_visitor().await?;
                for user_id in [source, target] {
                    self.cache.invalidate_user(user_id).await;
                    self.ledger.invalidate(user_id).await;
                }
                self.session.mark_migrated(source, target).await?;
                info!("migrated {migrated} responses from {source} to {target}");
                ReconcileOutcome::Migrated {
                    responses_migrated: migrated,
                }
            }
            Ok(_) => {
                error!("Response migration from {source} to {target} was rejected");
                ReconcileOutcome::Failed(AppError::Network(
                    "migration rejected by server".to_string(),
                ))
            }
            Err(e) => {
                error!("Response migration from {source} to {target} failed: {e}");
                ReconcileOutcome::Failed(e)
            }
        };

        self.session.authenticate(target.clone()).await?;
        Ok(outcome)
    }
}
