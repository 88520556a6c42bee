use std::collections::{BTreeSet, HashMap};

use crate::backends::{AccessToken, Asset, HistorianBackend, VariableInfo};
use crate::error::Result;

/// Declared value type of a variable as far as result typing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredType {
    Numeric,
    Text,
}

impl DeclaredType {
    pub fn from_data_type(data_type: &str) -> Self {
        if data_type == "String" {
            DeclaredType::Text
        } else {
            DeclaredType::Numeric
        }
    }
}

/// Read-only name/id/type mappings for the variables a backend exposes.
///
/// Names are `<asset name>.<variable name>`.
#[derive(Debug, Default, Clone)]
pub struct VariableDirectory {
    name_to_id: HashMap<String, String>,
    name_to_type: HashMap<String, DeclaredType>,
}

impl VariableDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_catalog(assets: &[Asset], variables: &[VariableInfo]) -> Self {
        let asset_names: HashMap<&str, &str> = assets
            .iter()
            .map(|a| (a.asset_id.as_str(), a.name.as_str()))
            .collect();
        let mut directory = VariableDirectory::new();
        for var in variables {
            let asset = asset_names
                .get(var.asset_id.as_str())
                .copied()
                .unwrap_or("undefined");
            let name = format!("{asset}.{}", var.variable_name);
            directory.insert(name, var.variable_id.clone(), DeclaredType::from_data_type(&var.data_type));
        }
        directory
    }

    /// List assets and variables from the backend and build the mappings.
    pub async fn discover(backend: &dyn HistorianBackend, token: &AccessToken) -> Result<Self> {
        let assets = backend.list_assets(token).await?;
        let variables = backend.list_variables(token).await?;
        tracing::info!(
            assets = assets.len(),
            variables = variables.len(),
            "variable directory discovered"
        );
        Ok(Self::from_catalog(&assets, &variables))
    }

    pub fn insert(&mut self, name: impl Into<String>, id: impl Into<String>, declared: DeclaredType) {
        let name = name.into();
        let id = id.into();
        self.name_to_type.insert(name.clone(), declared);
        self.name_to_id.insert(name, id);
    }

    pub fn id_for(&self, name: &str) -> Option<&str> {
        self.name_to_id.get(name).map(String::as_str)
    }

    /// Unknown names are numeric.
    pub fn declared_type(&self, name: &str) -> DeclaredType {
        self.name_to_type
            .get(name)
            .copied()
            .unwrap_or(DeclaredType::Numeric)
    }

    /// Sorted variable names for editor pickers.
    pub fn options(&self) -> Vec<String> {
        self.name_to_id
            .keys()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.name_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name_to_id.is_empty()
    }
}
