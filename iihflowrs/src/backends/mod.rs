//! Historian backend interface.
//!
//! The three data access patterns (raw samples, one-shot aggregate, bucketed aggregate
//! trend) plus the catalog calls used to build the variable directory. Transport,
//! authentication and routing live in the implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classify::SeriesKey;
use crate::error::Result;
use crate::models::SortOrder;

/// Half-open request window, also used for continuation windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: Value,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: impl Into<Value>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }
}

/// Samples for one series within a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSamples {
    pub key: SeriesKey,
    pub samples: Vec<Sample>,
}

/// One page of raw or trend data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataPage {
    pub series: Vec<SeriesSamples>,
    /// Window for the next request; `None` once the backend has no more data.
    #[serde(default)]
    pub continuation: Option<TimeWindow>,
}

/// Result of a one-shot aggregate for one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateValue {
    pub key: SeriesKey,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub asset_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableInfo {
    pub variable_id: String,
    pub variable_name: String,
    pub asset_id: String,
    /// Declared value type, e.g. `Float`, `Int32`, `String`.
    #[serde(default)]
    pub data_type: String,
}

/// Bearer token with its absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Unified interface for the historian's data and catalog APIs.
#[async_trait]
pub trait HistorianBackend: Send + Sync {
    /// Raw samples for `ids` inside `window`.
    async fn fetch_raw(
        &self,
        token: &AccessToken,
        ids: &[String],
        window: TimeWindow,
        order: SortOrder,
    ) -> Result<DataPage>;

    /// Aggregated values per `bucket_millis` bucket inside `window`.
    async fn fetch_aggregate_trend(
        &self,
        token: &AccessToken,
        series: &[SeriesKey],
        window: TimeWindow,
        bucket_millis: u64,
    ) -> Result<DataPage>;

    /// One aggregated value per series over the whole `window`.
    async fn fetch_aggregate_single(
        &self,
        token: &AccessToken,
        series: &[SeriesKey],
        window: TimeWindow,
    ) -> Result<Vec<AggregateValue>>;

    async fn list_assets(&self, token: &AccessToken) -> Result<Vec<Asset>>;

    async fn list_variables(&self, token: &AccessToken) -> Result<Vec<VariableInfo>>;

    /// Unauthenticated reachability check.
    async fn ping(&self) -> Result<()>;
}

/// Issues session tokens; user provisioning and credentials stay with the implementor.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn issue_token(&self) -> Result<AccessToken>;
}
