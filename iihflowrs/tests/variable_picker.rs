//! Variable-picker queries, editor options, connection test and the host wire format.

mod common;

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{engine, engine_with, raw_page, ScriptedBackend};
use iihflow::config::IihflowConfig;
use iihflow::models::{AggregateMode, Comparator, LogicalOp, SortOrder};
use iihflow::{QueryRequest, StaticTemplates, VariableQuery};

#[tokio::test(start_paused = true)]
async fn variable_query_returns_flat_values() {
    let backend = Arc::new(ScriptedBackend::new().push_raw(Ok(raw_page(
        "idS",
        &[(10, json!("RUN")), (20, json!("STOP")), (30, json!(3))],
        None,
    ))));
    let query: VariableQuery = serde_json::from_value(json!({
        "from": "2024-03-01T10:00:00Z",
        "to": "2024-03-01T11:00:00Z",
        "variablesNamesList": ["Line1.State"],
        "aggregateModesList": ["None"],
    }))
    .unwrap();

    let values = engine(backend)
        .run_variable_query(&query, &StaticTemplates::default(), &CancellationToken::new())
        .await
        .unwrap();
    let texts: Vec<_> = values.into_iter().map(|v| v.text).collect();
    assert_eq!(texts, vec!["RUN", "STOP", "3"]);
}

#[tokio::test(start_paused = true)]
async fn variable_query_truncates_to_configured_limit() {
    let backend = Arc::new(ScriptedBackend::new().push_raw(Ok(raw_page(
        "idB",
        &[(10, json!(1)), (20, json!(2)), (30, json!(3))],
        None,
    ))));
    let config = IihflowConfig::from_toml(
        r#"
        [datasources.plant.query]
        max_picker_values = 2
        "#,
    )
    .unwrap();
    let engine = engine_with(backend, config.for_datasource("plant"));
    let query: VariableQuery = serde_json::from_value(json!({
        "from": "1709287200000",
        "to": "1709290800000",
        "variablesNamesList": ["Line1.B"],
    }))
    .unwrap();

    let values = engine
        .run_variable_query(&query, &StaticTemplates::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(values.len(), 2);
}

#[tokio::test]
async fn variable_options_are_sorted_names() {
    let engine = engine(Arc::new(ScriptedBackend::new()));
    assert_eq!(
        engine.variable_options().await.unwrap(),
        vec!["Line1.A", "Line1.B", "Line1.State"]
    );
}

#[tokio::test]
async fn connection_test_reports_status() {
    let ok = engine(Arc::new(ScriptedBackend::new())).test_connection().await;
    assert!(ok.ok);

    let down = engine(Arc::new(ScriptedBackend::unreachable("connection refused")))
        .test_connection()
        .await;
    assert!(!down.ok);
    assert!(down.message.contains("connection refused"));
}

#[test]
fn panel_target_wire_format() {
    let query: QueryRequest = serde_json::from_value(json!({
        "refId": "B",
        "order": "Descending",
        "variablesNamesList": ["Line1.A", "${host}"],
        "aggregateModesList": ["Average"],
        "aliasesList": ["mean"],
        "aggregateTime": "5m",
        "where": {
            "items": [
                {"element1": "Line1.A", "comparator": ">=", "element2": "3"},
                {"element1": "${host}", "comparator": "not includes", "element2": "x"}
            ],
            "operators": ["", "or"]
        }
    }))
    .unwrap();

    assert_eq!(query.ref_id, "B");
    assert_eq!(query.from, "${__from:date}");
    assert_eq!(query.order, SortOrder::Descending);
    assert_eq!(query.variables.len(), 2);
    assert_eq!(query.variables[0].aggregate_mode, AggregateMode::Average);
    assert_eq!(query.variables[0].alias, "mean");
    assert_eq!(query.variables[1].aggregate_mode, AggregateMode::None);
    assert_eq!(query.variables[1].alias, "");
    assert_eq!(query.aggregate_time.bucket_millis(), Some(300_000));
    assert_eq!(query.filter.clauses[0].comparator, Comparator::Gte);
    assert_eq!(query.filter.clauses[1].comparator, Comparator::NotIncludes);
    assert_eq!(query.filter.operators, vec![LogicalOp::Unset, LogicalOp::Or]);
}
