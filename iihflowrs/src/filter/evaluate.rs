use crate::classify::SeriesKey;
use crate::models::LogicalOp;
use crate::pagination::SeriesBuffers;

use super::comparator::compare;
use super::compile::{CompiledClause, CompiledFilter};

/// Keep the rows of `rows` that satisfy `filter`.
///
/// Rows are visited in their current order. A clause whose series has no value at a row
/// is true when the same clause held on the previous row, and always true on the final
/// row. When the final row fails the combined test it is still emitted, carrying only the
/// single-aggregate values wherever they sat before ordering, or nothing at all when every
/// single-aggregate clause failed.
pub fn apply_filter(rows: SeriesBuffers, filter: &CompiledFilter) -> SeriesBuffers {
    if !filter.active {
        return rows;
    }

    let mut out = SeriesBuffers::new(rows.keys().cloned());
    out.set_singles(rows.singles().clone());

    let count = rows.len();
    let mut previous = vec![false; filter.clauses.len()];
    for row in 0..count {
        let last = row + 1 == count;
        let results: Vec<bool> = filter
            .clauses
            .iter()
            .zip(&previous)
            .map(|(clause, held_before)| clause_holds(clause, &rows, row, *held_before, last))
            .collect();

        if fold(filter, &results) {
            out.push_row(&rows, row, |_| true);
        } else if last {
            let single_results: Vec<bool> = filter
                .clauses
                .iter()
                .zip(&results)
                .filter(|(clause, _)| clause.single_aggregate)
                .map(|(_, held)| *held)
                .collect();
            if single_results.is_empty() || single_results.iter().any(|held| *held) {
                out.push_row(&rows, row, |key| rows.singles().contains_key(key));
                out.fill_last_row_with_singles();
            } else {
                out.push_row(&rows, row, |_| false);
            }
        }
        previous = results;
    }

    tracing::debug!(before = count, after = out.len(), "where filter applied");
    out
}

fn clause_holds(
    clause: &CompiledClause,
    rows: &SeriesBuffers,
    row: usize,
    held_before: bool,
    last: bool,
) -> bool {
    let Some(key) = clause.key.as_ref() else {
        return false;
    };
    let value = sample_value(rows, key, row, clause.single_aggregate);
    if value.is_none() && (held_before || last) {
        return true;
    }
    match compare(value, clause.comparator, &clause.operand) {
        Ok(held) => held,
        Err(e) => {
            tracing::warn!(series = %key, row, error = %e, "where clause could not be evaluated");
            false
        }
    }
}

fn sample_value<'a>(
    rows: &'a SeriesBuffers,
    key: &SeriesKey,
    row: usize,
    single_aggregate: bool,
) -> Option<&'a serde_json::Value> {
    match rows.value(key, row) {
        Some(v) => Some(v),
        None if single_aggregate => rows.singles().get(key),
        None => None,
    }
}

/// Left-to-right fold; an unset operator after the first clause joins with `and`.
fn fold(filter: &CompiledFilter, results: &[bool]) -> bool {
    let mut clauses = filter.clauses.iter().zip(results);
    let Some((_, first)) = clauses.next() else {
        return true;
    };
    clauses.fold(*first, |acc, (clause, held)| match clause.operator {
        LogicalOp::Or => acc || *held,
        LogicalOp::And | LogicalOp::Unset => acc && *held,
    })
}
