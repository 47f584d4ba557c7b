use crate::application::ports::ResponseGateway;
use crate::domain::entities::{BatchRequest, FlushError, FlushReport, MutationAction};
use crate::domain::value_objects::{ActionId, UserId};
use crate::infrastructure::cache::{ReadThroughCache, ResponseLedger};
use crate::shared::config::SyncConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// バッチ送信の確定結果を受け取る
#[async_trait]
pub trait FlushObserver: Send + Sync {
    async fn on_flush(&self, report: &FlushReport);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePhase {
    Idle,
    Pending,
    Flushing,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub phase: QueuePhase,
    pub pending: usize,
    pub in_flight: usize,
    pub flush_count: u64,
    pub failure_count: u64,
    pub last_flush_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct QueueState {
    // 投入順を保持する。ID はアクションごとに一意なので重複はしない
    pending: Vec<MutationAction>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
    in_flight: usize,
    flush_count: u64,
    failure_count: u64,
    last_flush_at: Option<DateTime<Utc>>,
}

struct QueueInner {
    gateway: Arc<dyn ResponseGateway>,
    cache: Arc<ReadThroughCache>,
    ledger: Arc<ResponseLedger>,
    debounce: Duration,
    max_attempts: u32,
    state: Mutex<QueueState>,
    observers: RwLock<Vec<Arc<dyn FlushObserver>>>,
}

/// ユーザー操作をまとめて 1 回の書き込みにするキュー
#[derive(Clone)]
pub struct MutationQueue {
    inner: Arc<QueueInner>,
}

impl MutationQueue {
    pub fn new(
        gateway: Arc<dyn ResponseGateway>,
        cache: Arc<ReadThroughCache>,
        ledger: Arc<ResponseLedger>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                gateway,
                cache,
                ledger,
                debounce: config.debounce(),
                max_attempts: config.max_attempts.max(1),
                state: Mutex::new(QueueState::default()),
                observers: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn subscribe(&self, observer: Arc<dyn FlushObserver>) {
        self.inner
            .observers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(observer);
    }

    /// アクションを積み、デバウンスタイマーを張り直す
    pub fn enqueue(&self, action: MutationAction) -> ActionId {
        let id = action.id.clone();
        let mut state = self.inner.lock_state();
        debug!(
            action_id = %id,
            kind = action.kind.as_str(),
            pending = state.pending.len() + 1,
            "enqueued mutation"
        );
        state.pending.push(action);
        QueueInner::arm_timer(&self.inner, &mut state, self.inner.debounce);
        id
    }

    /// タイマーを止めて即座に送信し、結果を待つ
    pub async fn flush_now(&self) -> Vec<FlushReport> {
        let actions = self.inner.take_all();
        self.inner.send(actions).await
    }

    /// ページ離脱用。戻る前にキューを空にして送信を開始する。
    pub fn flush_on_exit(&self) -> Option<JoinHandle<Vec<FlushReport>>> {
        let actions = self.inner.take_all();
        if actions.is_empty() {
            return None;
        }
        info!("flushing {} pending mutations on exit", actions.len());
        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(async move { inner.send(actions).await }))
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock_state().pending.len()
    }

    pub fn pending_actions(&self) -> Vec<MutationAction> {
        self.inner.lock_state().pending.clone()
    }

    /// 未送信アクションの宛先ユーザーを付け替える。付け替えた件数を返す。
    pub fn reassign_pending(&self, from: &UserId, to: &UserId) -> usize {
        let mut state = self.inner.lock_state();
        let mut moved = 0;
        for action in state.pending.iter_mut().filter(|a| &a.user_id == from) {
            action.user_id = to.clone();
            moved += 1;
        }
        if moved > 0 {
            debug!("reassigned {moved} pending mutations from {from} to {to}");
        }
        moved
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.inner.lock_state();
        let phase = if !state.pending.is_empty() {
            QueuePhase::Pending
        } else if state.in_flight > 0 {
            QueuePhase::Flushing
        } else {
            QueuePhase::Idle
        };
        QueueStatus {
            phase,
            pending: state.pending.len(),
            in_flight: state.in_flight,
            flush_count: state.flush_count,
            failure_count: state.failure_count,
            last_flush_at: state.last_flush_at,
        }
    }
}

impl QueueInner {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn arm_timer(inner: &Arc<Self>, state: &mut QueueState, delay: Duration) {
        Self::cancel_timer(state);
        let generation = state.generation;
        let task_inner = Arc::clone(inner);

        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let actions = {
                let mut state = task_inner.lock_state();
                // 張り直し・即時送信で世代が進んでいれば何もしない
                if state.generation != generation {
                    return;
                }
                state.timer = None;
                std::mem::take(&mut state.pending)
            };
            task_inner.send(actions).await;
        }));
    }

    fn cancel_timer(state: &mut QueueState) {
        if let Some(handle) = state.timer.take() {
            handle.abort();
        }
        state.generation = state.generation.wrapping_add(1);
    }

    /// スナップショットとクリアを 1 つのロック区間で行う
    fn take_all(&self) -> Vec<MutationAction> {
        let mut state = self.lock_state();
        Self::cancel_timer(&mut state);
        std::mem::take(&mut state.pending)
    }

    async fn send(self: &Arc<Self>, actions: Vec<MutationAction>) -> Vec<FlushReport> {
        if actions.is_empty() {
            return Vec::new();
        }

        let mut reports = Vec::new();
        for (user_id, batch) in group_by_user(actions) {
            reports.push(self.send_batch(user_id, batch).await);
        }
        reports
    }

    async fn send_batch(
        self: &Arc<Self>,
        user_id: UserId,
        mut actions: Vec<MutationAction>,
    ) -> FlushReport {
        for action in actions.iter_mut() {
            action.attempt += 1;
        }
        self.lock_state().in_flight += 1;

        info!(user_id = %user_id, count = actions.len(), "flushing mutation batch");
        let request = BatchRequest {
            actions: actions.clone(),
            user_id: user_id.clone(),
        };

        let submitted = self.gateway.submit_batch(request).await;
        let (confirmed, unsuccessful, retryable, result) = match submitted {
            Ok(response) => {
                let total = actions.len();
                let (confirmed, rejected): (Vec<_>, Vec<_>) = actions
                    .into_iter()
                    .partition(|action| response.succeeded(&action.id));
                let result = if rejected.is_empty() {
                    Ok(response.processed)
                } else {
                    Err(FlushError::Rejected {
                        failed: rejected.len(),
                        total,
                    })
                };
                // サーバーが個別に拒否したものは再送しても結果が変わらない
                (confirmed, rejected, false, result)
            }
            Err(e) => {
                error!("Batch flush failed for {}: {}", user_id, e);
                let retryable = e.is_transient();
                (Vec::new(), actions, retryable, Err(FlushError::Transport(e)))
            }
        };

        let (requeued, failed): (Vec<_>, Vec<_>) = unsuccessful
            .into_iter()
            .partition(|action| retryable && action.attempt < self.max_attempts);

        {
            let mut state = self.lock_state();
            state.in_flight = state.in_flight.saturating_sub(1);
            state.flush_count += 1;
            state.last_flush_at = Some(Utc::now());
            if result.is_err() {
                state.failure_count += 1;
            }
            if !requeued.is_empty() {
                let attempt = requeued.iter().map(|a| a.attempt).max().unwrap_or(1);
                let mut restored = requeued.clone();
                restored.append(&mut state.pending);
                state.pending = restored;
                Self::arm_timer(self, &mut state, self.debounce * attempt);
                warn!(
                    "requeued {} failed mutations for {} (attempt {})",
                    requeued.len(),
                    user_id,
                    attempt
                );
            }
        }

        if !confirmed.is_empty() {
            self.cache.invalidate_user(&user_id).await;
            self.ledger.invalidate(&user_id).await;
        }
        if !failed.is_empty() {
            warn!(
                "dropping {} mutations for {} (retryable: {}, max attempts: {})",
                failed.len(),
                user_id,
                retryable,
                self.max_attempts
            );
        }

        let report = FlushReport {
            user_id,
            confirmed,
            requeued,
            failed,
            result,
            settled_at: Utc::now(),
        };
        self.notify(&report).await;
        report
    }

    async fn notify(&self, report: &FlushReport) {
        let observers: Vec<Arc<dyn FlushObserver>> = self
            .observers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for observer in observers {
            observer.on_flush(report).await;
        }
    }
}

/// 初出順を保ったままユーザーごとに分ける
fn group_by_user(actions: Vec<MutationAction>) -> Vec<(UserId, Vec<MutationAction>)> {
    let mut batches: Vec<(UserId, Vec<MutationAction>)> = Vec::new();
    for action in actions {
        match batches.iter_mut().find(|(user, _)| user == &action.user_id) {
            Some((_, batch)) => batch.push(action),
            None => batches.push((action.user_id.clone(), vec![action])),
        }
    }
    batches
}
