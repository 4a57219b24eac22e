//! Duplicate merge pass over stored board-alight rows.

use tracing::{debug, info};

use crate::error::StoreError;
use crate::model::BoardAlight;
use crate::store::{BoardAlightStore, RowFilter, SortField};

/// What one merge pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub groups_merged: usize,
    pub rows_removed: usize,
}

/// Sums observations, skipping absent ones. All absent stays absent.
/// Totals saturate at `i64::MAX`.
fn sum_counts(values: impl Iterator<Item = Option<i64>>) -> Option<i64> {
    values
        .flatten()
        .fold(None, |total, n| Some(total.unwrap_or(0).saturating_add(n)))
}

/// Collapses rows sharing a merge key into one.
///
/// Non-additive fields come from the first row. Additive counters are summed
/// with absent values treated as no observation.
pub fn merge_group(rows: &[BoardAlight]) -> Option<BoardAlight> {
    let first = rows.first()?;

    macro_rules! sum_field {
        ($field:ident) => {
            sum_counts(rows.iter().map(|row| row.$field))
        };
    }

    Some(BoardAlight {
        boardings: sum_field!(boardings),
        alightings: sum_field!(alightings),
        bike_boardings: sum_field!(bike_boardings),
        bike_alightings: sum_field!(bike_alightings),
        ramp_boardings: sum_field!(ramp_boardings),
        ramp_alightings: sum_field!(ramp_alightings),
        ..first.clone()
    })
}

/// Replaces every group of rows sharing a merge key with one merged row.
///
/// Destructive: the group's rows are deleted and the merged row inserted in
/// their place. Groups of one are left alone, so a second pass is a no-op.
#[tracing::instrument(skip(store))]
pub async fn merge_duplicates(store: &dyn BoardAlightStore) -> Result<MergeOutcome, StoreError> {
    let rows = store.query(&RowFilter::all(), &[SortField::MergeKey]).await?;
    let mut outcome = MergeOutcome::default();

    for group in rows.chunk_by(|a, b| a.merge_key() == b.merge_key()) {
        if group.len() < 2 {
            continue;
        }
        let Some(merged) = merge_group(group) else {
            continue;
        };

        let key = merged.merge_key();
        let removed = store.delete_where(&key).await?;
        store.insert_batch(vec![merged]).await?;

        debug!(
            trip_id = %key.trip_id,
            stop_id = %key.stop_id,
            service_date = key.service_date,
            removed,
            "Merged duplicate observations"
        );
        outcome.groups_merged += 1;
        outcome.rows_removed += removed.saturating_sub(1);
    }

    info!(
        groups = outcome.groups_merged,
        removed = outcome.rows_removed,
        "Merge pass complete"
    );
    Ok(outcome)
}
