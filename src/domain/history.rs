//! 応答履歴から「現在の応答」を導く純粋関数群。
//!
//! (user, event) ごとに `created_at` 最大のレコードが現在値になる。同時刻は
//! `id` の大小で決めるため、配列順に依存しない。

use crate::domain::entities::ResponseRecord;
use crate::domain::value_objects::{EventId, RecordId, ResponseValue, UserId};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

pub fn latest<'a>(
    records: &'a [ResponseRecord],
    user_id: &UserId,
    event_id: &EventId,
) -> Option<&'a ResponseRecord> {
    records
        .iter()
        .filter(|record| record.concerns(user_id, event_id))
        .max_by(|a, b| a.cmp_recency(b))
}

/// 現在の応答。`None` は未回答（または null で上書きされた状態）。
pub fn current_value(
    records: &[ResponseRecord],
    user_id: &UserId,
    event_id: &EventId,
) -> Option<ResponseValue> {
    latest(records, user_id, event_id).and_then(|record| record.final_response)
}

pub fn group_latest_by_event<'a>(
    records: &'a [ResponseRecord],
    user_id: &UserId,
) -> HashMap<EventId, &'a ResponseRecord> {
    let mut grouped: HashMap<EventId, &ResponseRecord> = HashMap::new();
    for record in records.iter().filter(|record| &record.user_id == user_id) {
        keep_newer(&mut grouped, record.event_id.clone(), record);
    }
    grouped
}

pub fn group_latest_by_user<'a>(
    records: &'a [ResponseRecord],
    event_id: &EventId,
) -> HashMap<UserId, &'a ResponseRecord> {
    let mut grouped: HashMap<UserId, &ResponseRecord> = HashMap::new();
    for record in records.iter().filter(|record| &record.event_id == event_id) {
        keep_newer(&mut grouped, record.user_id.clone(), record);
    }
    grouped
}

fn keep_newer<'a, K: std::hash::Hash + Eq>(
    grouped: &mut HashMap<K, &'a ResponseRecord>,
    key: K,
    record: &'a ResponseRecord,
) {
    grouped
        .entry(key)
        .and_modify(|current| {
            if record.cmp_recency(*current) == Ordering::Greater {
                *current = record;
            }
        })
        .or_insert(record);
}

/// 2 つの履歴の和集合（`id` で重複排除）を古い順に並べて返す
pub fn merge(left: &[ResponseRecord], right: &[ResponseRecord]) -> Vec<ResponseRecord> {
    let mut seen: HashSet<&RecordId> = HashSet::with_capacity(left.len() + right.len());
    let mut merged: Vec<ResponseRecord> = left
        .iter()
        .chain(right.iter())
        .filter(|record| seen.insert(&record.id))
        .cloned()
        .collect();
    merged.sort_by(|a, b| a.cmp_recency(b));
    merged
}
