//! Board-alight destination store.
//!
//! [`BoardAlightStore`] is the async trait the pipeline writes through.
//! [`MemoryStore`] keeps rows in insertion order behind a single-writer lock.

use std::cmp::Ordering;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::model::{BoardAlight, MergeKey};

/// Row selection for [`BoardAlightStore::query`]. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    pub service_date: Option<i64>,
    pub trip_id: Option<String>,
    pub stop_id: Option<String>,
}

impl RowFilter {
    pub fn all() -> Self {
        Self::default()
    }

    fn matches(&self, row: &BoardAlight) -> bool {
        self.service_date.is_none_or(|date| row.service_date == date)
            && self.trip_id.as_ref().is_none_or(|id| &row.trip_id == id)
            && self.stop_id.as_ref().is_none_or(|id| &row.stop_id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    ServiceDate,
    TripId,
    StopId,
    StopSequence,
    /// Every merge-key field, in key order.
    MergeKey,
}

impl SortField {
    fn compare(self, a: &BoardAlight, b: &BoardAlight) -> Ordering {
        match self {
            SortField::ServiceDate => a.service_date.cmp(&b.service_date),
            SortField::TripId => a.trip_id.cmp(&b.trip_id),
            SortField::StopId => a.stop_id.cmp(&b.stop_id),
            SortField::StopSequence => a.stop_sequence.cmp(&b.stop_sequence),
            SortField::MergeKey => a.merge_key().cmp(&b.merge_key()),
        }
    }
}

#[async_trait]
pub trait BoardAlightStore: Send + Sync {
    /// Appends `rows` as one unit. Concurrent batches never interleave.
    async fn insert_batch(&self, rows: Vec<BoardAlight>) -> Result<(), StoreError>;

    /// Deletes every row whose merge key equals `key`. Returns how many went.
    async fn delete_where(&self, key: &MergeKey) -> Result<usize, StoreError>;

    /// Returns matching rows, stably sorted by `sort` (insertion order when empty).
    async fn query(&self, filter: &RowFilter, sort: &[SortField]) -> Result<Vec<BoardAlight>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<BoardAlight>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl BoardAlightStore for MemoryStore {
    async fn insert_batch(&self, rows: Vec<BoardAlight>) -> Result<(), StoreError> {
        self.rows.lock().await.extend(rows);
        Ok(())
    }

    async fn delete_where(&self, key: &MergeKey) -> Result<usize, StoreError> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|row| &row.merge_key() != key);
        Ok(before - rows.len())
    }

    async fn query(&self, filter: &RowFilter, sort: &[SortField]) -> Result<Vec<BoardAlight>, StoreError> {
        let mut matched: Vec<BoardAlight> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            sort.iter()
                .map(|field| field.compare(a, b))
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        Ok(matched)
    }
}
