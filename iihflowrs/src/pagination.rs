//! Pagination engine.
//!
//! Each access group is fetched to completion before the next one starts (raw, then
//! single aggregate, then aggregate trend). Pages are folded into a [`SeriesBuffers`]
//! value: a timestamp axis in first-seen order plus one index-aligned column per series.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::backends::{AccessToken, AggregateValue, DataPage, TimeWindow};
use crate::classify::{AccessKind, QueryPlan, SeriesKey};
use crate::config::{FailureMode, PaginationConfig};
use crate::error::{IihflowError, Result};
use crate::models::SortOrder;
use crate::session::Session;

/// Timestamp axis plus one column per series, all of equal length.
///
/// A timestamp occupies exactly one axis position no matter how many pages or groups
/// report it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesBuffers {
    axis: Vec<DateTime<Utc>>,
    positions: HashMap<DateTime<Utc>, usize>,
    columns: HashMap<SeriesKey, Vec<Option<Value>>>,
    singles: HashMap<SeriesKey, Value>,
}

impl SeriesBuffers {
    pub fn new(keys: impl IntoIterator<Item = SeriesKey>) -> Self {
        Self {
            columns: keys.into_iter().map(|k| (k, Vec::new())).collect(),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.axis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axis.is_empty()
    }

    pub fn axis(&self) -> &[DateTime<Utc>] {
        &self.axis
    }

    pub fn keys(&self) -> impl Iterator<Item = &SeriesKey> {
        self.columns.keys()
    }

    pub fn column(&self, key: &SeriesKey) -> Option<&[Option<Value>]> {
        self.columns.get(key).map(Vec::as_slice)
    }

    pub fn value(&self, key: &SeriesKey, row: usize) -> Option<&Value> {
        self.columns.get(key)?.get(row)?.as_ref()
    }

    /// One-shot aggregate results by series, independent of where they landed on the axis.
    pub fn singles(&self) -> &HashMap<SeriesKey, Value> {
        &self.singles
    }

    pub fn set_singles(&mut self, singles: HashMap<SeriesKey, Value>) {
        self.singles = singles;
    }

    pub fn position_of(&self, timestamp: &DateTime<Utc>) -> Option<usize> {
        self.positions.get(timestamp).copied()
    }

    /// Axis position for `timestamp`, appending it when unseen.
    pub fn touch(&mut self, timestamp: DateTime<Utc>) -> usize {
        if let Some(position) = self.position_of(&timestamp) {
            return position;
        }
        let position = self.axis.len();
        self.axis.push(timestamp);
        self.positions.insert(timestamp, position);
        for column in self.columns.values_mut() {
            column.push(None);
        }
        position
    }

    fn set(&mut self, key: &SeriesKey, position: usize, value: Value) {
        let len = self.axis.len();
        let column = self
            .columns
            .entry(key.clone())
            .or_insert_with(|| vec![None; len]);
        column[position] = Some(value);
    }

    /// Fold one page into the buffers. Seen timestamps are overwritten in place.
    pub fn merge_page(mut self, page: &DataPage) -> Self {
        for series in &page.series {
            for sample in &series.samples {
                let position = self.touch(sample.timestamp);
                self.set(&series.key, position, sample.value.clone());
            }
        }
        self
    }

    /// Place one-shot aggregate values on the last axis position, or on a new `to`
    /// position when the axis is empty.
    pub fn record_single(mut self, values: Vec<AggregateValue>, to: DateTime<Utc>) -> Self {
        for aggregate in values {
            let position = match self.axis.len() {
                0 => self.touch(to),
                len => len - 1,
            };
            self.set(&aggregate.key, position, aggregate.value.clone());
            self.singles.insert(aggregate.key, aggregate.value);
        }
        self
    }

    /// Write every one-shot aggregate value onto the last row.
    pub fn fill_last_row_with_singles(&mut self) {
        let Some(position) = self.axis.len().checked_sub(1) else {
            return;
        };
        let singles: Vec<(SeriesKey, Value)> = self
            .singles
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in singles {
            self.set(&key, position, value);
        }
    }

    /// Append row `row` of `source`, keeping only the values whose key passes `keep`.
    pub fn push_row(&mut self, source: &SeriesBuffers, row: usize, keep: impl Fn(&SeriesKey) -> bool) {
        let Some(timestamp) = source.axis.get(row).copied() else {
            return;
        };
        let position = self.axis.len();
        self.axis.push(timestamp);
        self.positions.insert(timestamp, position);
        for column in self.columns.values_mut() {
            column.push(None);
        }
        for (key, column) in &source.columns {
            if !keep(key) {
                continue;
            }
            if let Some(value) = column.get(row).cloned().flatten() {
                self.set(key, position, value);
            }
        }
    }

    /// New buffers holding the rows of `self` in the order given by `order`.
    pub(crate) fn reproject(&self, order: &[usize]) -> Self {
        let axis: Vec<DateTime<Utc>> = order.iter().map(|&i| self.axis[i]).collect();
        let positions = axis.iter().enumerate().map(|(i, t)| (*t, i)).collect();
        let columns = self
            .columns
            .iter()
            .map(|(key, column)| (key.clone(), order.iter().map(|&i| column[i].clone()).collect()))
            .collect();
        Self {
            axis,
            positions,
            columns,
            singles: self.singles.clone(),
        }
    }
}

/// How a failed backend call is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    FailFast,
    /// Re-issue the same request, waiting `initial_backoff * 2^attempt` in between.
    Retry {
        max_retries: u32,
        initial_backoff: Duration,
    },
}

impl FailurePolicy {
    /// Backoff before retry number `attempt` (0-indexed), or `None` when retries are
    /// exhausted.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            FailurePolicy::FailFast => None,
            FailurePolicy::Retry {
                max_retries,
                initial_backoff,
            } => (attempt < *max_retries)
                .then(|| initial_backoff.saturating_mul(2u32.saturating_pow(attempt))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationPolicy {
    pub request_delay: Duration,
    pub max_iterations: u32,
    pub failure: FailurePolicy,
}

impl Default for PaginationPolicy {
    fn default() -> Self {
        Self::from(&PaginationConfig::default())
    }
}

impl From<&PaginationConfig> for PaginationPolicy {
    fn from(config: &PaginationConfig) -> Self {
        let failure = match config.failure_policy {
            FailureMode::FailFast => FailurePolicy::FailFast,
            FailureMode::Retry => FailurePolicy::Retry {
                max_retries: config.max_retries,
                initial_backoff: Duration::from_millis(config.backoff_ms),
            },
        };
        Self {
            request_delay: config.request_delay(),
            max_iterations: config.max_iterations,
            failure,
        }
    }
}

/// Progress of one access group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Pending,
    InFlight { iteration: u32 },
    Done,
}

/// Everything a group fetch needs besides the group itself.
///
/// The access token is taken from `session` before every request, so a long
/// pagination run refreshes it when it nears expiry.
pub struct FetchContext<'a> {
    pub session: &'a Session,
    pub policy: &'a PaginationPolicy,
    pub cancel: &'a CancellationToken,
}

enum GroupRequest<'a> {
    Raw { ids: Vec<String>, order: SortOrder },
    Single { series: &'a [SeriesKey] },
    Trend { series: &'a [SeriesKey], bucket_millis: u64 },
}

impl GroupRequest<'_> {
    fn kind(&self) -> AccessKind {
        match self {
            GroupRequest::Raw { .. } => AccessKind::Raw,
            GroupRequest::Single { .. } => AccessKind::SingleAggregate,
            GroupRequest::Trend { .. } => AccessKind::TrendAggregate,
        }
    }
}

enum GroupResponse {
    Page(DataPage),
    Values(Vec<AggregateValue>),
}

/// Fetch every access group of `plan` over `window`, in raw, single, trend order.
pub async fn collect(
    ctx: &FetchContext<'_>,
    plan: &QueryPlan,
    window: TimeWindow,
    order: SortOrder,
) -> Result<SeriesBuffers> {
    let buffers = SeriesBuffers::new(plan.entries.iter().map(|e| e.key.clone()));
    let groups = &plan.groups;

    let mut requests = Vec::with_capacity(3);
    if !groups.raw.is_empty() {
        requests.push(GroupRequest::Raw {
            ids: groups.raw_ids(),
            order,
        });
    }
    if !groups.single.is_empty() {
        requests.push(GroupRequest::Single {
            series: &groups.single,
        });
    }
    if let (false, Some(bucket_millis)) = (groups.trend.is_empty(), plan.bucket_millis) {
        requests.push(GroupRequest::Trend {
            series: &groups.trend,
            bucket_millis,
        });
    }

    let mut buffers = buffers;
    for request in &requests {
        buffers = run_group(ctx, request, window, buffers).await?;
    }
    Ok(buffers)
}

async fn run_group(
    ctx: &FetchContext<'_>,
    request: &GroupRequest<'_>,
    initial: TimeWindow,
    mut buffers: SeriesBuffers,
) -> Result<SeriesBuffers> {
    let kind = request.kind();
    let mut state = GroupState::Pending;
    let mut window = initial;
    let mut failures = 0u32;
    tracing::debug!(group = kind.as_str(), ?state, "access group starting");

    for iteration in 1..=ctx.policy.max_iterations {
        if ctx.cancel.is_cancelled() {
            return Err(IihflowError::Cancelled);
        }
        pause(ctx.cancel, ctx.policy.request_delay).await?;
        state = GroupState::InFlight { iteration };
        tracing::trace!(group = kind.as_str(), ?state, from = %window.from, to = %window.to, "page request");

        let token = ctx.session.access_token().await?;
        let response = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(IihflowError::Cancelled),
            response = fetch(ctx, &token, request, window) => response,
        };

        match response {
            Ok(GroupResponse::Values(values)) => {
                tracing::debug!(group = kind.as_str(), values = values.len(), "aggregate values received");
                buffers = buffers.record_single(values, initial.to);
                state = GroupState::Done;
            }
            Ok(GroupResponse::Page(page)) => {
                failures = 0;
                let next = page.continuation;
                tracing::debug!(
                    group = kind.as_str(),
                    iteration,
                    series = page.series.len(),
                    more = next.is_some(),
                    "page received"
                );
                buffers = buffers.merge_page(&page);
                match next {
                    Some(continuation) => window = continuation,
                    None => state = GroupState::Done,
                }
            }
            Err(e) => {
                let Some(delay) = ctx.policy.failure.delay_for_attempt(failures) else {
                    tracing::error!(group = kind.as_str(), iteration, error = %e, "backend request failed");
                    return Err(e);
                };
                failures += 1;
                tracing::warn!(
                    group = kind.as_str(),
                    attempt = failures,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "backend request failed; retrying"
                );
                pause(ctx.cancel, delay).await?;
            }
        }

        if state == GroupState::Done {
            return Ok(buffers);
        }
    }

    Err(IihflowError::PaginationLimit {
        group: kind.as_str(),
        iterations: ctx.policy.max_iterations,
    })
}

async fn fetch(
    ctx: &FetchContext<'_>,
    token: &AccessToken,
    request: &GroupRequest<'_>,
    window: TimeWindow,
) -> Result<GroupResponse> {
    let backend = ctx.session.backend();
    match request {
        GroupRequest::Raw { ids, order } => backend
            .fetch_raw(token, ids, window, *order)
            .await
            .map(GroupResponse::Page),
        GroupRequest::Single { series } => backend
            .fetch_aggregate_single(token, series, window)
            .await
            .map(GroupResponse::Values),
        GroupRequest::Trend {
            series,
            bucket_millis,
        } => backend
            .fetch_aggregate_trend(token, series, window, *bucket_millis)
            .await
            .map(GroupResponse::Page),
    }
}

/// Sleep for `duration` unless cancelled first.
async fn pause(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    if duration.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(IihflowError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::backends::{Sample, SeriesSamples};
    use crate::models::AggregateMode;

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn page(key: &SeriesKey, samples: &[(i64, i64)]) -> DataPage {
        DataPage {
            series: vec![SeriesSamples {
                key: key.clone(),
                samples: samples.iter().map(|(t, v)| Sample::new(ts(*t), *v)).collect(),
            }],
            continuation: None,
        }
    }

    #[test]
    fn test_merge_dedupes_timestamps_across_pages() {
        let a = SeriesKey::raw("a");
        let b = SeriesKey::raw("b");
        let buffers = SeriesBuffers::new([a.clone(), b.clone()])
            .merge_page(&page(&a, &[(10, 1), (20, 2)]))
            .merge_page(&page(&b, &[(20, 5), (30, 6)]))
            .merge_page(&page(&a, &[(20, 3)]));

        assert_eq!(buffers.axis(), &[ts(10), ts(20), ts(30)]);
        assert_eq!(
            buffers.column(&a).unwrap(),
            &[Some(json!(1)), Some(json!(3)), None]
        );
        assert_eq!(
            buffers.column(&b).unwrap(),
            &[None, Some(json!(5)), Some(json!(6))]
        );
    }

    #[test]
    fn test_single_value_placement() {
        let a = SeriesKey::raw("a");
        let avg = SeriesKey::new("c", AggregateMode::Average);
        let single = || {
            vec![AggregateValue {
                key: avg.clone(),
                value: json!(4.5),
            }]
        };

        // empty axis: a new position at `to`
        let buffers = SeriesBuffers::new([avg.clone()]).record_single(single(), ts(100));
        assert_eq!(buffers.axis(), &[ts(100)]);

        // descending pages: the last position even when `to` is on the axis
        let buffers = SeriesBuffers::new([a.clone(), avg.clone()])
            .merge_page(&page(&a, &[(100, 1), (50, 2)]))
            .record_single(single(), ts(100));
        assert_eq!(buffers.value(&avg, 0), None);
        assert_eq!(buffers.value(&avg, 1), Some(&json!(4.5)));

        // ascending pages
        let buffers = SeriesBuffers::new([a.clone(), avg.clone()])
            .merge_page(&page(&a, &[(10, 1), (20, 2)]))
            .record_single(single(), ts(100));
        assert_eq!(buffers.len(), 2);
        assert_eq!(buffers.value(&avg, 1), Some(&json!(4.5)));
        assert_eq!(buffers.singles().get(&avg), Some(&json!(4.5)));
    }

    #[test]
    fn test_fill_last_row_with_singles() {
        let a = SeriesKey::raw("a");
        let avg = SeriesKey::new("c", AggregateMode::Average);
        let mut buffers = SeriesBuffers::new([a.clone(), avg.clone()])
            .merge_page(&page(&a, &[(10, 1), (20, 2)]))
            .record_single(
                vec![AggregateValue {
                    key: avg.clone(),
                    value: json!(7),
                }],
                ts(100),
            )
            .reproject(&[1, 0]);
        assert_eq!(buffers.value(&avg, 0), Some(&json!(7)));
        assert_eq!(buffers.value(&avg, 1), None);

        buffers.fill_last_row_with_singles();
        assert_eq!(buffers.value(&avg, 1), Some(&json!(7)));

        let mut empty = SeriesBuffers::new([avg.clone()]);
        empty.fill_last_row_with_singles();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_unknown_series_column_is_padded() {
        let a = SeriesKey::raw("a");
        let extra = SeriesKey::raw("x");
        let buffers = SeriesBuffers::new([a.clone()])
            .merge_page(&page(&a, &[(10, 1), (20, 2)]))
            .merge_page(&page(&extra, &[(20, 9)]));
        assert_eq!(buffers.column(&extra).unwrap(), &[None, Some(json!(9))]);
    }

    #[test]
    fn test_retry_backoff_doubles() {
        let policy = FailurePolicy::Retry {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for_attempt(3), None);
        assert_eq!(FailurePolicy::FailFast.delay_for_attempt(0), None);
    }

    #[test]
    fn test_policy_from_config() {
        let config = PaginationConfig {
            failure_policy: FailureMode::Retry,
            max_retries: 2,
            backoff_ms: 50,
            ..PaginationConfig::default()
        };
        let policy = PaginationPolicy::from(&config);
        assert_eq!(policy.request_delay, Duration::from_millis(200));
        assert_eq!(policy.max_iterations, 99_999);
        assert_eq!(
            policy.failure,
            FailurePolicy::Retry {
                max_retries: 2,
                initial_backoff: Duration::from_millis(50)
            }
        );
    }
}
