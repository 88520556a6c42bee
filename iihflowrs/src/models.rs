use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// One panel target as issued by the host.
///
/// Deserializes from the host's wire shape, where the variable list is stored as three
/// parallel lists (`variablesNamesList`, `aggregateModesList`, `aliasesList`) and the
/// where clause as `{items: [{element1, comparator, element2}], operators}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    pub ref_id: String,
    pub from: String,
    pub to: String,
    pub order: SortOrder,
    pub variables: Vec<VariableSpec>,
    pub aggregate_time: AggregateTime,
    pub filter: WhereFilter,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    #[serde(default)]
    pub aggregate_mode: AggregateMode,
    #[serde(default)]
    pub alias: String,
}

impl VariableSpec {
    pub fn new(name: impl Into<String>, aggregate_mode: AggregateMode) -> Self {
        Self {
            name: name.into(),
            aggregate_mode,
            alias: String::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }
}

impl QueryRequest {
    /// Build the variable list from parallel name/mode/alias lists.
    ///
    /// The name list decides the length; missing modes default to `None` and missing
    /// aliases to the empty string so the three lists always line up.
    pub fn variables_from_lists(
        names: Vec<String>,
        modes: Vec<AggregateMode>,
        aliases: Vec<String>,
    ) -> Vec<VariableSpec> {
        let mut modes = modes.into_iter();
        let mut aliases = aliases.into_iter();
        names
            .into_iter()
            .map(|name| VariableSpec {
                name,
                aggregate_mode: modes.next().unwrap_or_default(),
                alias: aliases.next().unwrap_or_default(),
            })
            .collect()
    }
}

impl<'de> Deserialize<'de> for QueryRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Raw {
            #[serde(default)]
            ref_id: String,
            #[serde(default = "default_from")]
            from: String,
            #[serde(default = "default_to")]
            to: String,
            #[serde(default)]
            order: SortOrder,
            #[serde(default)]
            variables_names_list: Vec<String>,
            #[serde(default)]
            aggregate_modes_list: Vec<AggregateMode>,
            #[serde(default)]
            aliases_list: Vec<String>,
            #[serde(default)]
            aggregate_time: AggregateTime,
            #[serde(default, rename = "where")]
            filter: WhereFilter,
        }

        let raw = Raw::deserialize(deserializer)?;
        Ok(QueryRequest {
            ref_id: raw.ref_id,
            from: raw.from,
            to: raw.to,
            order: raw.order,
            variables: QueryRequest::variables_from_lists(
                raw.variables_names_list,
                raw.aggregate_modes_list,
                raw.aliases_list,
            ),
            aggregate_time: raw.aggregate_time,
            filter: raw.filter,
        })
    }
}

fn default_from() -> String {
    "${__from:date}".to_string()
}

fn default_to() -> String {
    "${__to:date}".to_string()
}

/// Variable-picker query: a single variable resolved to a flat list of values.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableQuery {
    pub from: String,
    pub to: String,
    pub variable_name: String,
    pub aggregate_mode: AggregateMode,
    pub aggregate_time: AggregateTime,
}

impl<'de> Deserialize<'de> for VariableQuery {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Raw {
            #[serde(default = "default_from")]
            from: String,
            #[serde(default = "default_to")]
            to: String,
            #[serde(default)]
            variables_names_list: Vec<String>,
            #[serde(default)]
            aggregate_modes_list: Vec<AggregateMode>,
            #[serde(default)]
            aggregate_time: AggregateTime,
        }

        let raw = Raw::deserialize(deserializer)?;
        Ok(VariableQuery {
            from: raw.from,
            to: raw.to,
            variable_name: raw.variables_names_list.into_iter().next().unwrap_or_default(),
            aggregate_mode: raw.aggregate_modes_list.into_iter().next().unwrap_or_default(),
            aggregate_time: raw.aggregate_time,
        })
    }
}

impl VariableQuery {
    /// Expand into a regular one-variable query.
    pub fn to_query_request(&self) -> QueryRequest {
        QueryRequest {
            ref_id: "variable".to_string(),
            from: self.from.clone(),
            to: self.to.clone(),
            order: SortOrder::Ascending,
            variables: vec![VariableSpec::new(
                self.variable_name.clone(),
                self.aggregate_mode.clone(),
            )],
            aggregate_time: self.aggregate_time,
            filter: WhereFilter::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Descending,
    /// Anything the host sends other than `Descending` sorts ascending.
    #[default]
    #[serde(other)]
    Ascending,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "Ascending",
            SortOrder::Descending => "Descending",
        }
    }
}

/// Aggregation requested for one variable.
///
/// Unknown mode names are carried through verbatim so newer backend aggregations keep
/// working without a release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AggregateMode {
    #[default]
    None,
    Average,
    Count,
    Counter,
    First,
    Last,
    Max,
    Min,
    Sum,
    TimeWeightedAverage,
    MinMaxTrend,
    Gantt,
    GanttView,
    StepDuration,
    ValueChanges,
    Other(String),
}

impl AggregateMode {
    pub fn as_str(&self) -> &str {
        match self {
            AggregateMode::None => "None",
            AggregateMode::Average => "Average",
            AggregateMode::Count => "Count",
            AggregateMode::Counter => "Counter",
            AggregateMode::First => "First",
            AggregateMode::Last => "Last",
            AggregateMode::Max => "Max",
            AggregateMode::Min => "Min",
            AggregateMode::Sum => "Sum",
            AggregateMode::TimeWeightedAverage => "TimeWeightedAverage",
            AggregateMode::MinMaxTrend => "MinMaxTrend",
            AggregateMode::Gantt => "Gantt",
            AggregateMode::GanttView => "GanttView",
            AggregateMode::StepDuration => "StepDuration",
            AggregateMode::ValueChanges => "ValueChanges",
            AggregateMode::Other(name) => name,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, AggregateMode::None)
    }

    /// Modes that only make sense over a time bucket.
    pub fn needs_time_bucket(&self) -> bool {
        matches!(
            self,
            AggregateMode::MinMaxTrend
                | AggregateMode::Gantt
                | AggregateMode::GanttView
                | AggregateMode::StepDuration
                | AggregateMode::ValueChanges
        )
    }
}

impl From<String> for AggregateMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" | "None" => AggregateMode::None,
            "Average" => AggregateMode::Average,
            "Count" => AggregateMode::Count,
            "Counter" => AggregateMode::Counter,
            "First" => AggregateMode::First,
            "Last" => AggregateMode::Last,
            "Max" => AggregateMode::Max,
            "Min" => AggregateMode::Min,
            "Sum" => AggregateMode::Sum,
            "TimeWeightedAverage" => AggregateMode::TimeWeightedAverage,
            "MinMaxTrend" => AggregateMode::MinMaxTrend,
            "Gantt" => AggregateMode::Gantt,
            "GanttView" => AggregateMode::GanttView,
            "StepDuration" => AggregateMode::StepDuration,
            "ValueChanges" => AggregateMode::ValueChanges,
            _ => AggregateMode::Other(value),
        }
    }
}

impl From<AggregateMode> for String {
    fn from(value: AggregateMode) -> Self {
        value.as_str().to_string()
    }
}

impl FromStr for AggregateMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(AggregateMode::from(s.to_string()))
    }
}

impl fmt::Display for AggregateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time bucket for trend aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateTime {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "10m")]
    TenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    OneDay,
    #[default]
    #[serde(rename = "None", other)]
    None,
}

impl AggregateTime {
    /// Bucket size in milliseconds, `None` when no bucket was requested.
    pub fn bucket_millis(&self) -> Option<u64> {
        match self {
            AggregateTime::None => None,
            AggregateTime::OneMinute => Some(60_000),
            AggregateTime::FiveMinutes => Some(300_000),
            AggregateTime::TenMinutes => Some(600_000),
            AggregateTime::ThirtyMinutes => Some(1_800_000),
            AggregateTime::OneHour => Some(3_600_000),
            AggregateTime::TwelveHours => Some(43_200_000),
            AggregateTime::OneDay => Some(86_400_000),
        }
    }
}

/// The user-configured where clause.
///
/// `operators[0]` is never read; `operators[j]` joins clause `j` onto the result of
/// clauses `0..j`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhereFilter {
    #[serde(default, rename = "items")]
    pub clauses: Vec<WhereClause>,
    #[serde(default)]
    pub operators: Vec<LogicalOp>,
}

impl WhereFilter {
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhereClause {
    #[serde(default, rename = "element1")]
    pub left: String,
    #[serde(default)]
    pub comparator: Comparator,
    #[serde(default, rename = "element2")]
    pub right: String,
}

impl WhereClause {
    pub fn new(left: impl Into<String>, comparator: Comparator, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            comparator,
            right: right.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[default]
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Neq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "includes")]
    Includes,
    #[serde(rename = "not includes")]
    NotIncludes,
    #[serde(rename = "starts with")]
    StartsWith,
    #[serde(rename = "ends with")]
    EndsWith,
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    #[default]
    #[serde(rename = "")]
    Unset,
    #[serde(rename = "and")]
    And,
    #[serde(rename = "or")]
    Or,
}
