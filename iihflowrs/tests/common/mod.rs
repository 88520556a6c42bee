//! Scripted historian backend shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use iihflow::backends::{
    AccessToken, AggregateValue, Asset, DataPage, HistorianBackend, Sample, SeriesSamples,
    TimeWindow, TokenProvider, VariableInfo,
};
use iihflow::config::ResolvedDatasourceConfig;
use iihflow::error::{IihflowError, Result};
use iihflow::models::SortOrder;
use iihflow::{QueryEngine, SeriesKey, Session};

pub const FROM: &str = "2024-03-01T10:00:00Z";
pub const TO: &str = "2024-03-01T11:00:00Z";

pub fn ts(secs_after_from: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + Duration::seconds(secs_after_from)
}

pub fn millis(secs_after_from: i64) -> Value {
    Value::from(ts(secs_after_from).timestamp_millis())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Raw {
        ids: Vec<String>,
        window: TimeWindow,
        order: SortOrder,
    },
    Single {
        series: Vec<SeriesKey>,
        window: TimeWindow,
    },
    Trend {
        series: Vec<SeriesKey>,
        window: TimeWindow,
        bucket_millis: u64,
    },
}

#[derive(Default)]
pub struct ScriptedBackend {
    raw: Mutex<VecDeque<Result<DataPage>>>,
    single: Mutex<VecDeque<Result<Vec<AggregateValue>>>>,
    trend: Mutex<VecDeque<Result<DataPage>>>,
    /// Every page answers with a continuation window once the script runs out.
    endless: bool,
    ping_error: Option<String>,
    calls: Mutex<Vec<Call>>,
    /// Token value presented with each data request, in call order.
    tokens: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endless() -> Self {
        Self {
            endless: true,
            ..Self::default()
        }
    }

    pub fn unreachable(message: &str) -> Self {
        Self {
            ping_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn push_raw(self, page: Result<DataPage>) -> Self {
        self.raw.lock().unwrap().push_back(page);
        self
    }

    pub fn push_single(self, values: Result<Vec<AggregateValue>>) -> Self {
        self.single.lock().unwrap().push_back(values);
        self
    }

    pub fn push_trend(self, page: Result<DataPage>) -> Self {
        self.trend.lock().unwrap().push_back(page);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    fn record(&self, token: &AccessToken, call: Call) {
        self.tokens.lock().unwrap().push(token.value.clone());
        self.calls.lock().unwrap().push(call);
    }

    fn next_page(&self, queue: &Mutex<VecDeque<Result<DataPage>>>, window: TimeWindow) -> Result<DataPage> {
        if let Some(page) = queue.lock().unwrap().pop_front() {
            return page;
        }
        let continuation = self.endless.then_some(window);
        Ok(DataPage {
            series: vec![],
            continuation,
        })
    }
}

#[async_trait]
impl HistorianBackend for ScriptedBackend {
    async fn fetch_raw(
        &self,
        token: &AccessToken,
        ids: &[String],
        window: TimeWindow,
        order: SortOrder,
    ) -> Result<DataPage> {
        self.record(
            token,
            Call::Raw {
                ids: ids.to_vec(),
                window,
                order,
            },
        );
        self.next_page(&self.raw, window)
    }

    async fn fetch_aggregate_trend(
        &self,
        token: &AccessToken,
        series: &[SeriesKey],
        window: TimeWindow,
        bucket_millis: u64,
    ) -> Result<DataPage> {
        self.record(
            token,
            Call::Trend {
                series: series.to_vec(),
                window,
                bucket_millis,
            },
        );
        self.next_page(&self.trend, window)
    }

    async fn fetch_aggregate_single(
        &self,
        token: &AccessToken,
        series: &[SeriesKey],
        window: TimeWindow,
    ) -> Result<Vec<AggregateValue>> {
        self.record(
            token,
            Call::Single {
                series: series.to_vec(),
                window,
            },
        );
        self.single.lock().unwrap().pop_front().unwrap_or(Ok(vec![]))
    }

    async fn list_assets(&self, _token: &AccessToken) -> Result<Vec<Asset>> {
        Ok(vec![Asset {
            asset_id: "asset-1".to_string(),
            name: "Line1".to_string(),
        }])
    }

    async fn list_variables(&self, _token: &AccessToken) -> Result<Vec<VariableInfo>> {
        let var = |id: &str, name: &str, data_type: &str| VariableInfo {
            variable_id: id.to_string(),
            variable_name: name.to_string(),
            asset_id: "asset-1".to_string(),
            data_type: data_type.to_string(),
        };
        Ok(vec![
            var("idA", "A", "Float"),
            var("idB", "B", "Int32"),
            var("idS", "State", "String"),
        ])
    }

    async fn ping(&self) -> Result<()> {
        match &self.ping_error {
            Some(message) => Err(IihflowError::Backend(message.clone())),
            None => Ok(()),
        }
    }
}

pub struct HourTokens;

#[async_trait]
impl TokenProvider for HourTokens {
    async fn issue_token(&self) -> Result<AccessToken> {
        Ok(AccessToken {
            value: "token".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }
}

/// Numbered tokens (`token-1`, `token-2`, ...) valid for `lifetime`.
pub struct CountingTokens {
    issued: AtomicUsize,
    lifetime: Duration,
}

impl CountingTokens {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            issued: AtomicUsize::new(0),
            lifetime,
        }
    }

    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for CountingTokens {
    async fn issue_token(&self) -> Result<AccessToken> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AccessToken {
            value: format!("token-{n}"),
            expires_at: Utc::now() + self.lifetime,
        })
    }
}

pub fn engine(backend: Arc<ScriptedBackend>) -> QueryEngine {
    engine_with(backend, ResolvedDatasourceConfig::default())
}

pub fn engine_with(backend: Arc<ScriptedBackend>, config: ResolvedDatasourceConfig) -> QueryEngine {
    let session = Session::new(backend, Arc::new(HourTokens), &config.session);
    QueryEngine::new(session, config)
}

pub fn engine_with_tokens(backend: Arc<ScriptedBackend>, tokens: Arc<dyn TokenProvider>) -> QueryEngine {
    let config = ResolvedDatasourceConfig::default();
    let session = Session::new(backend, tokens, &config.session);
    QueryEngine::new(session, config)
}

pub fn raw_page(id: &str, samples: &[(i64, Value)], continuation: Option<TimeWindow>) -> DataPage {
    DataPage {
        series: vec![SeriesSamples {
            key: SeriesKey::raw(id),
            samples: samples
                .iter()
                .map(|(secs, v)| Sample::new(ts(*secs), v.clone()))
                .collect(),
        }],
        continuation,
    }
}
