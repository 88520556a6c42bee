//! Partition the requested variables into the three backend access patterns.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::directory::{DeclaredType, VariableDirectory};
use crate::models::{AggregateMode, QueryRequest};
use crate::template::{resolve_value, substitute, TemplateVariable};

/// Series identifier plus aggregation mode; the unit of buffering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    pub id: String,
    pub mode: AggregateMode,
}

impl SeriesKey {
    pub fn new(id: impl Into<String>, mode: AggregateMode) -> Self {
        Self {
            id: id.into(),
            mode,
        }
    }

    pub fn raw(id: impl Into<String>) -> Self {
        Self::new(id, AggregateMode::None)
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.id, self.mode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Raw,
    SingleAggregate,
    TrendAggregate,
}

impl AccessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessKind::Raw => "raw",
            AccessKind::SingleAggregate => "aggregate",
            AccessKind::TrendAggregate => "aggregate trend",
        }
    }

    fn classify(mode: &AggregateMode, bucket_millis: Option<u64>) -> Option<Self> {
        match (mode, bucket_millis) {
            (_, Some(_)) => Some(AccessKind::TrendAggregate),
            (AggregateMode::None, None) => Some(AccessKind::Raw),
            (mode, None) if !mode.needs_time_bucket() => Some(AccessKind::SingleAggregate),
            _ => None,
        }
    }
}

/// One surviving variable-list position.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    pub name: String,
    pub key: SeriesKey,
    pub display_name: String,
    pub declared: DeclaredType,
    /// `None` when the mode needs a time bucket and none was requested: the column is
    /// still emitted but nothing is fetched for it.
    pub access: Option<AccessKind>,
}

/// Per-pattern fetch lists. A series appears in at most one list, at most once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessGroups {
    pub raw: Vec<SeriesKey>,
    pub single: Vec<SeriesKey>,
    pub trend: Vec<SeriesKey>,
}

impl AccessGroups {
    pub fn raw_ids(&self) -> Vec<String> {
        self.raw.iter().map(|k| k.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty() && self.single.is_empty() && self.trend.is_empty()
    }

    fn push(&mut self, kind: AccessKind, key: SeriesKey) {
        let group = match kind {
            AccessKind::Raw => &mut self.raw,
            AccessKind::SingleAggregate => &mut self.single,
            AccessKind::TrendAggregate => &mut self.trend,
        };
        if !group.contains(&key) {
            group.push(key);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPlan {
    pub entries: Vec<PlanEntry>,
    pub groups: AccessGroups,
    pub bucket_millis: Option<u64>,
}

impl QueryPlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn requested_ids(&self) -> HashSet<&str> {
        self.entries.iter().map(|e| e.key.id.as_str()).collect()
    }

    /// First requested entry for a series id, in request order.
    pub fn entry_for_id(&self, id: &str) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.key.id == id)
    }

    pub fn is_single_aggregate(&self, key: &SeriesKey) -> bool {
        self.groups.single.contains(key)
    }
}

/// Build the plan for `query`.
///
/// Processing stops at the first position whose name does not resolve or maps to no
/// known id; later positions are dropped even when they would resolve.
pub fn classify(
    query: &QueryRequest,
    variables: &[TemplateVariable],
    directory: &VariableDirectory,
) -> QueryPlan {
    let bucket_millis = query.aggregate_time.bucket_millis();
    let mut plan = QueryPlan {
        bucket_millis,
        ..QueryPlan::default()
    };

    for (position, spec) in query.variables.iter().enumerate() {
        let Some(name) = resolve_value(&spec.name, variables) else {
            tracing::debug!(position, name = %spec.name, "unresolved variable name; dropping remaining variables");
            break;
        };
        let Some(id) = directory.id_for(&name) else {
            tracing::debug!(position, name = %name, "unknown variable name; dropping remaining variables");
            break;
        };

        let mode = spec.aggregate_mode.clone();
        let alias = substitute(&spec.alias, variables);
        let display_name = if !alias.is_empty() {
            alias
        } else if mode.is_none() {
            name.clone()
        } else {
            format!("{name}_{mode}")
        };

        let key = SeriesKey::new(id, mode);
        let access = AccessKind::classify(&key.mode, bucket_millis);
        match access {
            Some(kind) => plan.groups.push(kind, key.clone()),
            None => tracing::debug!(series = %key, "aggregation needs a time bucket; not fetched"),
        }

        plan.entries.push(PlanEntry {
            declared: directory.declared_type(&name),
            name,
            key,
            display_name,
            access,
        });
    }

    plan
}
