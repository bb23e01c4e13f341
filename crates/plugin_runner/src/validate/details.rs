use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

use jsonschema::JSONSchema;
use serde_json::Value;

use super::{compile_schema, schema_findings, Finding};
use crate::{RunnerError, ValidatorError};

/// Scanner category a plugin belongs to. The report itself does not carry it,
/// so the operator supplies it.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PluginType {
    Configuration,
    Inventory,
    Sbom,
    Secrets,
    StaticAnalysis,
    Vulnerability,
}

impl PluginType {
    pub const ALL: [PluginType; 6] = [
        PluginType::Configuration,
        PluginType::Inventory,
        PluginType::Sbom,
        PluginType::Secrets,
        PluginType::StaticAnalysis,
        PluginType::Vulnerability,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::Configuration => "configuration",
            PluginType::Inventory => "inventory",
            PluginType::Sbom => "sbom",
            PluginType::Secrets => "secrets",
            PluginType::StaticAnalysis => "static_analysis",
            PluginType::Vulnerability => "vulnerability",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginType {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PluginType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| RunnerError::UnknownPluginType(s.to_string()))
    }
}

/// Validation strategy for the `details` member of a report.
///
/// Findings use pointers relative to `details`; the caller re-roots them.
pub trait DetailValidator: fmt::Debug + Send + Sync {
    fn validate(&self, details: &Value) -> Vec<Finding>;
}

/// Accepts any value.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyDetails;

impl DetailValidator for AnyDetails {
    fn validate(&self, _details: &Value) -> Vec<Finding> {
        Vec::new()
    }
}

/// Checks `details` against a caller-supplied JSON Schema (draft 2020-12).
#[derive(Debug)]
pub struct SchemaDetails {
    schema: JSONSchema,
}

impl SchemaDetails {
    pub fn new(schema: &Value) -> Result<Self, ValidatorError> {
        Ok(Self {
            schema: compile_schema(schema)?,
        })
    }
}

impl DetailValidator for SchemaDetails {
    fn validate(&self, details: &Value) -> Vec<Finding> {
        schema_findings(&self.schema, details)
    }
}

/// Plugin type -> details strategy. Unregistered types fall back to [`AnyDetails`].
#[derive(Debug, Clone, Default)]
pub struct DetailRegistry {
    validators: BTreeMap<PluginType, Arc<dyn DetailValidator>>,
}

impl DetailRegistry {
    pub fn register(mut self, plugin_type: PluginType, validator: impl DetailValidator + 'static) -> Self {
        self.validators.insert(plugin_type, Arc::new(validator));
        self
    }

    pub fn get(&self, plugin_type: PluginType) -> Arc<dyn DetailValidator> {
        match self.validators.get(&plugin_type) {
            Some(validator) => Arc::clone(validator),
            None => Arc::new(AnyDetails),
        }
    }

    pub fn is_registered(&self, plugin_type: PluginType) -> bool {
        self.validators.contains_key(&plugin_type)
    }
}
