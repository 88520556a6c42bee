//! Comparator semantics for where clauses.
//!
//! Values are compared the way the host's scripting layer coerces them: equality and the
//! string tests work on the value's text form (a missing value reads as `undefined`),
//! the ordering comparators on its numeric form. `<=` and `>=` evaluate exactly like `>`.

use serde_json::Value;
use thiserror::Error;

use crate::models::Comparator;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("no value to apply '{comparator}' to")]
    MissingValue { comparator: &'static str },
}

/// Evaluate `value <comparator> operand`.
pub fn compare(value: Option<&Value>, comparator: Comparator, operand: &str) -> Result<bool, EvalError> {
    let result = match comparator {
        Comparator::Eq => coerce_string(value) == operand,
        Comparator::Neq => coerce_string(value) != operand,
        Comparator::Lt => coerce_number(value) < parse_number(operand),
        Comparator::Gt | Comparator::Lte | Comparator::Gte => {
            coerce_number(value) > parse_number(operand)
        }
        Comparator::Includes => present(value, "includes")?.contains(operand),
        Comparator::NotIncludes => !present(value, "not includes")?.contains(operand),
        Comparator::StartsWith => present(value, "starts with")?.starts_with(operand),
        Comparator::EndsWith => present(value, "ends with")?.ends_with(operand),
        Comparator::Unsupported => false,
    };
    Ok(result)
}

fn present(value: Option<&Value>, comparator: &'static str) -> Result<String, EvalError> {
    match value {
        Some(v) => Ok(coerce_string(Some(v))),
        None => Err(EvalError::MissingValue { comparator }),
    }
}

/// Text form of a sample value.
pub fn coerce_string(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) => float_string(f),
            _ => n.to_string(),
        },
        Some(other) => other.to_string(),
    }
}

fn float_string(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f == f64::INFINITY {
        "Infinity".to_string()
    } else if f == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e21 {
        format!("{}", f as i128)
    } else {
        format!("{f}")
    }
}

/// Numeric form of a sample value; `NaN` when it has none.
pub fn coerce_number(value: Option<&Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => parse_number(s),
        Some(_) => f64::NAN,
    }
}

/// Numeric form of operand text: blank is zero, anything unparsable is `NaN`.
pub fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    match trimmed {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => {
            if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
                return i64::from_str_radix(hex, 16).map(|v| v as f64).unwrap_or(f64::NAN);
            }
            // Rust accepts "inf"/"nan" spellings that the host does not
            let lower = trimmed.to_ascii_lowercase();
            if lower.contains("inf") || lower.contains("nan") {
                return f64::NAN;
            }
            trimmed.parse::<f64>().unwrap_or(f64::NAN)
        }
    }
}
