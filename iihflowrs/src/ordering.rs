//! Order the merged axis by timestamp.

use crate::models::SortOrder;
use crate::pagination::SeriesBuffers;

/// Permutation of axis positions sorted by timestamp. Stable for equal timestamps.
pub fn ordered_indexes(buffers: &SeriesBuffers, order: SortOrder) -> Vec<usize> {
    let axis = buffers.axis();
    let mut indexes: Vec<usize> = (0..axis.len()).collect();
    match order {
        SortOrder::Ascending => indexes.sort_by(|&a, &b| axis[a].cmp(&axis[b])),
        SortOrder::Descending => indexes.sort_by(|&a, &b| axis[b].cmp(&axis[a])),
    }
    indexes
}

/// Re-project the axis and every column through `indexes`. Nothing is dropped.
pub fn reproject(buffers: &SeriesBuffers, indexes: &[usize]) -> SeriesBuffers {
    buffers.reproject(indexes)
}

pub fn order_buffers(buffers: SeriesBuffers, order: SortOrder) -> SeriesBuffers {
    let indexes = ordered_indexes(&buffers, order);
    if indexes.iter().enumerate().all(|(i, &j)| i == j) {
        return buffers;
    }
    reproject(&buffers, &indexes)
}
