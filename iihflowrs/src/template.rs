//! Dashboard template variable resolution.
//!
//! Placeholders have the shape `${name}` or `${name_k}`. For multi-valued variables `k`
//! selects an option by position; an option only resolves while it is selected.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^{}]+)\}").expect("placeholder pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    Constant,
    Textbox,
    Query,
    Custom,
}

impl VariableKind {
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, VariableKind::Query | VariableKind::Custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableOption {
    pub text: String,
    pub value: String,
    #[serde(default)]
    pub selected: bool,
}

/// A host-level dashboard variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: VariableKind,
    #[serde(default)]
    pub current: Option<String>,
    #[serde(default)]
    pub options: Vec<VariableOption>,
    /// When set, `options[0]` is the synthetic "All" entry.
    #[serde(default)]
    pub include_all: bool,
}

impl TemplateVariable {
    pub fn single(name: impl Into<String>, kind: VariableKind, current: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            current: Some(current.into()),
            options: Vec::new(),
            include_all: false,
        }
    }

    pub fn multi(name: impl Into<String>, kind: VariableKind, options: Vec<VariableOption>) -> Self {
        Self {
            name: name.into(),
            kind,
            current: None,
            options,
            include_all: false,
        }
    }

    fn value_at(&self, index: Option<usize>) -> Option<String> {
        if !self.kind.is_multi_valued() {
            return self.current.clone();
        }
        let Some(k) = index else {
            return self.current.clone();
        };
        let position = if self.include_all { k + 1 } else { k };
        self.options
            .get(position)
            .filter(|opt| opt.selected)
            .map(|opt| opt.value.clone())
    }
}

/// Host template service consumed by the query pipeline.
pub trait TemplateService: Send + Sync {
    /// Current dashboard variable definitions.
    fn variables(&self) -> Vec<TemplateVariable>;

    /// Plain host substitution, used on the `from`/`to` bounds.
    fn replace(&self, text: &str) -> String;
}

/// A fixed set of variables plus host built-ins such as `${__from:date}`.
#[derive(Debug, Clone, Default)]
pub struct StaticTemplates {
    variables: Vec<TemplateVariable>,
    builtins: HashMap<String, String>,
}

impl StaticTemplates {
    pub fn new(variables: Vec<TemplateVariable>) -> Self {
        Self {
            variables,
            builtins: HashMap::new(),
        }
    }

    /// Register a built-in token; `key` is the text between `${` and `}`.
    pub fn with_builtin(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.builtins.insert(key.into(), value.into());
        self
    }
}

impl TemplateService for StaticTemplates {
    fn variables(&self) -> Vec<TemplateVariable> {
        self.variables.clone()
    }

    fn replace(&self, text: &str) -> String {
        PLACEHOLDER
            .replace_all(text, |caps: &Captures<'_>| {
                if let Some(value) = self.builtins.get(&caps[1]) {
                    return value.clone();
                }
                lookup(&caps[1], &self.variables).unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Whether `text` is exactly one placeholder.
pub fn is_placeholder(text: &str) -> bool {
    placeholder_body(text).is_some()
}

fn placeholder_body(text: &str) -> Option<&str> {
    let caps = PLACEHOLDER.captures(text)?;
    let whole = caps.get(0)?;
    if whole.start() == 0 && whole.end() == text.len() {
        caps.get(1).map(|m| m.as_str())
    } else {
        None
    }
}

/// Resolve a standalone placeholder token. `None` means unresolved.
pub fn resolve_token(token: &str, variables: &[TemplateVariable]) -> Option<String> {
    lookup(placeholder_body(token)?, variables)
}

/// Whole-value resolution: placeholders are resolved, any other text passes through.
pub fn resolve_value(text: &str, variables: &[TemplateVariable]) -> Option<String> {
    match placeholder_body(text) {
        Some(body) => lookup(body, variables),
        None => Some(text.to_string()),
    }
}

/// Substring resolution: every resolvable placeholder inside `text` is replaced, the
/// rest (including unresolved placeholders) is kept verbatim.
pub fn substitute(text: &str, variables: &[TemplateVariable]) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| {
            lookup(&caps[1], variables).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn lookup(body: &str, variables: &[TemplateVariable]) -> Option<String> {
    if let Some(var) = variables.iter().find(|v| v.name == body) {
        return var.value_at(None);
    }
    let (name, index) = body.rsplit_once('_')?;
    let index: usize = index.parse().ok()?;
    variables
        .iter()
        .find(|v| v.name == name)
        .and_then(|var| var.value_at(Some(index)))
}
