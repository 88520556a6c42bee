use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use iihflow::backends::{
    AccessToken, AggregateValue, Asset, DataPage, HistorianBackend, Sample, SeriesSamples,
    TimeWindow, TokenProvider, VariableInfo,
};
use iihflow::models::SortOrder;
use iihflow::{
    init_tracing, IihflowConfig, QueryEngine, QueryRequest, SeriesKey, Session, StaticTemplates,
};

/// One sample per minute for every series, served ten minutes per page.
struct InMemoryHistorian;

const PAGE: i64 = 10;

fn minute_samples(window: TimeWindow, seed: f64) -> Vec<Sample> {
    let mut samples = Vec::new();
    let mut t = window.from;
    while t < window.to && t < window.from + Duration::minutes(PAGE) {
        let x = t.timestamp() as f64 / 600.0;
        samples.push(Sample::new(t, ((x + seed).sin() * 10.0).round()));
        t += Duration::minutes(1);
    }
    samples
}

fn next_window(window: TimeWindow) -> Option<TimeWindow> {
    let next = window.from + Duration::minutes(PAGE);
    (next < window.to).then(|| TimeWindow::new(next, window.to))
}

#[async_trait]
impl HistorianBackend for InMemoryHistorian {
    async fn fetch_raw(
        &self,
        _token: &AccessToken,
        ids: &[String],
        window: TimeWindow,
        _order: SortOrder,
    ) -> iihflow::Result<DataPage> {
        let series = ids
            .iter()
            .enumerate()
            .map(|(i, id)| SeriesSamples {
                key: SeriesKey::raw(id.clone()),
                samples: minute_samples(window, i as f64),
            })
            .collect();
        Ok(DataPage {
            series,
            continuation: next_window(window),
        })
    }

    async fn fetch_aggregate_trend(
        &self,
        token: &AccessToken,
        series: &[SeriesKey],
        window: TimeWindow,
        _bucket_millis: u64,
    ) -> iihflow::Result<DataPage> {
        let ids: Vec<String> = series.iter().map(|k| k.id.clone()).collect();
        self.fetch_raw(token, &ids, window, SortOrder::Ascending).await
    }

    async fn fetch_aggregate_single(
        &self,
        _token: &AccessToken,
        series: &[SeriesKey],
        _window: TimeWindow,
    ) -> iihflow::Result<Vec<AggregateValue>> {
        Ok(series
            .iter()
            .map(|key| AggregateValue {
                key: key.clone(),
                value: json!(4.2),
            })
            .collect())
    }

    async fn list_assets(&self, _token: &AccessToken) -> iihflow::Result<Vec<Asset>> {
        Ok(vec![Asset {
            asset_id: "press-1".to_string(),
            name: "Press".to_string(),
        }])
    }

    async fn list_variables(&self, _token: &AccessToken) -> iihflow::Result<Vec<VariableInfo>> {
        Ok(["Pressure", "Temperature"]
            .iter()
            .enumerate()
            .map(|(i, name)| VariableInfo {
                variable_id: format!("var-{i}"),
                variable_name: name.to_string(),
                asset_id: "press-1".to_string(),
                data_type: "Float".to_string(),
            })
            .collect())
    }

    async fn ping(&self) -> iihflow::Result<()> {
        Ok(())
    }
}

struct LocalTokens;

#[async_trait]
impl TokenProvider for LocalTokens {
    async fn issue_token(&self) -> iihflow::Result<AccessToken> {
        Ok(AccessToken {
            value: "local".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = IihflowConfig::load_default().for_datasource("demo");
    let session = Session::new(Arc::new(InMemoryHistorian), Arc::new(LocalTokens), &config.session);
    let engine = QueryEngine::new(session, config);

    let now = Utc::now();
    let request: QueryRequest = serde_json::from_value(json!({
        "refId": "A",
        "from": (now - Duration::minutes(30)).to_rfc3339(),
        "to": now.to_rfc3339(),
        "order": "Descending",
        "variablesNamesList": ["Press.Pressure", "${signal}"],
        "aggregateModesList": ["None", "Average"],
        "where": {
            "items": [{"element1": "Press.Pressure", "comparator": ">", "element2": "0"}],
            "operators": [""]
        }
    }))?;
    let templates = StaticTemplates::new(vec![iihflow::TemplateVariable::single(
        "signal",
        iihflow::template::VariableKind::Constant,
        "Press.Temperature",
    )]);

    let status = engine.test_connection().await;
    println!("connection: {} ({})", status.ok, status.message);
    println!("variables: {:?}", engine.variable_options().await?);

    let frame = engine
        .run_query(&request, &templates, &CancellationToken::new())
        .await?;
    println!("{} rows", frame.len());
    println!("{}", serde_json::to_string_pretty(&frame)?);
    Ok(())
}
