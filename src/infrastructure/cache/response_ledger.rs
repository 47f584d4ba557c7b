use crate::domain::entities::ResponseRecord;
use crate::domain::history;
use crate::domain::value_objects::{RecordId, UserId};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct LedgerEntry {
    records: Vec<ResponseRecord>,
    // サーバーの履歴を一度取り込んだか
    hydrated: bool,
}

/// 応答履歴のローカル台帳。TTL を持たず、明示的な無効化でのみ消える。
#[derive(Default)]
pub struct ResponseLedger {
    entries: RwLock<HashMap<UserId, LedgerEntry>>,
}

impl ResponseLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// サーバー履歴を取り込み済みの場合のみ返す
    pub async fn get(&self, user_id: &UserId) -> Option<Vec<ResponseRecord>> {
        let entries = self.entries.read().await;
        entries
            .get(user_id)
            .filter(|entry| entry.hydrated)
            .map(|entry| entry.records.clone())
    }

    /// 取り込み状態に関係なく、手元にあるレコードをすべて返す
    pub async fn peek(&self, user_id: &UserId) -> Vec<ResponseRecord> {
        let entries = self.entries.read().await;
        entries
            .get(user_id)
            .map(|entry| entry.records.clone())
            .unwrap_or_default()
    }

    pub async fn set(&self, user_id: &UserId, records: Vec<ResponseRecord>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            user_id.clone(),
            LedgerEntry {
                records,
                hydrated: true,
            },
        );
    }

    /// 1 件追記する。未取り込みのユーザーでもエントリを作る。
    pub async fn append(&self, user_id: &UserId, record: ResponseRecord) {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(user_id.clone()).or_default();
        if entry.records.iter().any(|existing| existing.id == record.id) {
            return;
        }
        entry.records.push(record);
    }

    /// 和集合で取り込む。取り込み状態は変えない。
    pub async fn merge(&self, user_id: &UserId, records: &[ResponseRecord]) {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(user_id.clone()).or_default();
        entry.records = history::merge(&entry.records, records);
    }

    pub async fn remove_record(&self, user_id: &UserId, record_id: &RecordId) -> bool {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(user_id) else {
            return false;
        };
        let before = entry.records.len();
        entry.records.retain(|record| &record.id != record_id);
        before != entry.records.len()
    }

    /// 次の `get` で再取得させる。手元のレコードは再取得まで `peek` に残す。
    pub async fn invalidate(&self, user_id: &UserId) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(user_id) {
            entry.hydrated = false;
            debug!("ledger invalidated for {user_id}");
        }
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }

    pub async fn is_hydrated(&self, user_id: &UserId) -> bool {
        let entries = self.entries.read().await;
        entries.get(user_id).is_some_and(|entry| entry.hydrated)
    }
}
