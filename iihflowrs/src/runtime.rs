use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::backends::TimeWindow;
use crate::classify::classify;
use crate::config::ResolvedDatasourceConfig;
use crate::error::Result;
use crate::filter::{apply_filter, compile_filter};
use crate::frame::{DataFrame, MetricFindValue};
use crate::models::{QueryRequest, VariableQuery};
use crate::ordering::order_buffers;
use crate::pagination::{collect, FetchContext, PaginationPolicy};
use crate::session::Session;
use crate::template::TemplateService;

/// Outcome of a connection test; never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub ok: bool,
    pub message: String,
}

/// Runs panel queries against one datasource session.
#[derive(Clone)]
pub struct QueryEngine {
    session: Session,
    config: ResolvedDatasourceConfig,
    policy: PaginationPolicy,
}

impl QueryEngine {
    pub fn new(session: Session, config: ResolvedDatasourceConfig) -> Self {
        let policy = PaginationPolicy::from(&config.pagination);
        Self {
            session,
            config,
            policy,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &ResolvedDatasourceConfig {
        &self.config
    }

    /// Execute one target. Invalid or empty queries produce an empty frame.
    pub async fn run_query(
        &self,
        query: &QueryRequest,
        templates: &dyn TemplateService,
        cancel: &CancellationToken,
    ) -> Result<DataFrame> {
        let start = Instant::now();
        let Some(window) = self.time_window(query, templates) else {
            return Ok(DataFrame::empty(&query.ref_id));
        };
        if query.variables.is_empty() {
            tracing::debug!(ref_id = %query.ref_id, "no variables to query");
            return Ok(DataFrame::empty(&query.ref_id));
        }

        // a fresh token also rebuilds the directory
        self.session.access_token().await?;
        let directory = self.session.directory().await;
        let variables = templates.variables();

        let plan = classify(query, &variables, &directory);
        if plan.is_empty() {
            tracing::debug!(ref_id = %query.ref_id, "no variable resolved; nothing to fetch");
            return Ok(DataFrame::empty(&query.ref_id));
        }
        let filter = compile_filter(&query.filter, &plan, &variables, &directory);

        let ctx = FetchContext {
            session: &self.session,
            policy: &self.policy,
            cancel,
        };
        let buffers = collect(&ctx, &plan, window, query.order).await?;
        let ordered = order_buffers(buffers, query.order);
        let rows = apply_filter(ordered, &filter);
        let frame = DataFrame::assemble(&query.ref_id, &plan, &rows);

        tracing::debug!(
            ref_id = %query.ref_id,
            rows = frame.len(),
            columns = frame.fields.len(),
            filtered = filter.active,
            ms = start.elapsed().as_millis() as u64,
            "query executed"
        );
        Ok(frame)
    }

    /// Execute every target concurrently; frames come back in input order.
    pub async fn run_queries(
        &self,
        queries: &[QueryRequest],
        templates: &dyn TemplateService,
        cancel: &CancellationToken,
    ) -> Result<Vec<DataFrame>> {
        try_join_all(queries.iter().map(|q| self.run_query(q, templates, cancel))).await
    }

    /// Values of one variable over the query range, for the host's variable picker.
    pub async fn run_variable_query(
        &self,
        query: &VariableQuery,
        templates: &dyn TemplateService,
        cancel: &CancellationToken,
    ) -> Result<Vec<MetricFindValue>> {
        let frame = self
            .run_query(&query.to_query_request(), templates, cancel)
            .await?;
        Ok(frame.metric_find_values(self.config.query.max_picker_values))
    }

    /// Sorted variable names for editor pickers.
    pub async fn variable_options(&self) -> Result<Vec<String>> {
        self.session.access_token().await?;
        Ok(self.session.directory().await.options())
    }

    pub async fn test_connection(&self) -> ConnectionStatus {
        match self.session.backend().ping().await {
            Ok(()) => ConnectionStatus {
                ok: true,
                message: "Data source is working".to_string(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "connection test failed");
                ConnectionStatus {
                    ok: false,
                    message: e.to_string(),
                }
            }
        }
    }

    fn time_window(&self, query: &QueryRequest, templates: &dyn TemplateService) -> Option<TimeWindow> {
        let from = parse_time(&templates.replace(&query.from));
        let to = parse_time(&templates.replace(&query.to));
        let (Some(from), Some(mut to)) = (from, to) else {
            tracing::warn!(ref_id = %query.ref_id, from = %query.from, to = %query.to, "unparsable time range");
            return None;
        };
        if from.timestamp_millis() <= 0 || to.timestamp_millis() <= 0 || from >= to {
            tracing::debug!(ref_id = %query.ref_id, %from, %to, "empty or inverted time range");
            return None;
        }
        if self.config.query.clamp_to_now {
            to = to.min(Utc::now());
            if from >= to {
                tracing::debug!(ref_id = %query.ref_id, %from, "time range starts in the future");
                return None;
            }
        }
        Some(TimeWindow::new(from, to))
    }
}

/// RFC 3339 text or integer epoch milliseconds.
pub fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    text.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)
}
