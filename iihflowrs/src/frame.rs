//! Result assembly: filtered buffers to the host's columnar frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classify::QueryPlan;
use crate::directory::DeclaredType;
use crate::filter::coerce_string;
use crate::pagination::SeriesBuffers;

pub const TIME_FIELD: &str = "Time";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Time,
    Number,
    String,
}

impl From<DeclaredType> for FieldType {
    fn from(declared: DeclaredType) -> Self {
        match declared {
            DeclaredType::Text => FieldType::String,
            DeclaredType::Numeric => FieldType::Number,
        }
    }
}

/// One column. Missing values are `null`; time values are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFrame {
    pub ref_id: String,
    pub fields: Vec<Field>,
}

impl DataFrame {
    /// Frame with no fields, returned for queries that have nothing to fetch.
    pub fn empty(ref_id: impl Into<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            fields: Vec::new(),
        }
    }

    /// Time column followed by one column per plan entry, in request order.
    pub fn assemble(ref_id: impl Into<String>, plan: &QueryPlan, rows: &SeriesBuffers) -> Self {
        let mut fields = Vec::with_capacity(plan.entries.len() + 1);
        fields.push(Field {
            name: TIME_FIELD.to_string(),
            field_type: FieldType::Time,
            values: rows
                .axis()
                .iter()
                .map(|t| Value::from(t.timestamp_millis()))
                .collect(),
        });

        for entry in &plan.entries {
            let values = match rows.column(&entry.key) {
                Some(column) => column
                    .iter()
                    .map(|v| v.clone().unwrap_or(Value::Null))
                    .collect(),
                None => vec![Value::Null; rows.len()],
            };
            fields.push(Field {
                name: entry.display_name.clone(),
                field_type: entry.declared.into(),
                values,
            });
        }

        Self {
            ref_id: ref_id.into(),
            fields,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.first().map_or(0, |f| f.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Picker values from the first non-time column, nulls skipped. `limit` 0 keeps all.
    pub fn metric_find_values(&self, limit: usize) -> Vec<MetricFindValue> {
        let Some(field) = self.fields.iter().find(|f| f.field_type != FieldType::Time) else {
            return Vec::new();
        };
        let values = field
            .values
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| MetricFindValue {
                text: coerce_string(Some(v)),
            });
        if limit == 0 {
            values.collect()
        } else {
            values.take(limit).collect()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricFindValue {
    pub text: String,
}
