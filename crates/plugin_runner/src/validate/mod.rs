//! Structural validation of the JSON report a plugin prints on stdout.
//!
//! Checks run in a fixed order: UTF-8, JSON syntax, the report shape (`success`,
//! `truncated`, `details`, `errors`), the `truncated == false` constraint, and
//! finally the per-plugin-type [`DetailValidator`] for `details`. Only the first
//! two steps short-circuit; everything after collects every violation.

mod details;

use std::{fmt, sync::Arc, sync::OnceLock};

use jsonschema::{
    error::{TypeKind, ValidationErrorKind},
    Draft, JSONSchema, ValidationError,
};
use serde_json::Value;

use crate::ValidatorError;

pub use details::{AnyDetails, DetailRegistry, DetailValidator, PluginType, SchemaDetails};

const REPORT_SCHEMA: &str = include_str!("../../schemas/plugin-results.json");

/// One structural problem in a plugin report.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Finding {
    /// JSON pointer into the report; empty for whole-document problems.
    pub pointer: String,
    pub message: String,
}

impl Finding {
    pub fn new(pointer: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
            message: message.into(),
        }
    }

    pub fn document(message: impl Into<String>) -> Self {
        Self::new(String::new(), message)
    }

    /// Re-roots a finding produced against a sub-document.
    pub fn nested(self, prefix: &str) -> Self {
        Self {
            pointer: format!("{prefix}{}", self.pointer),
            message: self.message,
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at '{}': {}", self.pointer, self.message)
    }
}

/// Validates captured stdout against the report shape.
///
/// The compiled report schema is process-wide and immutable; constructing a
/// validator only selects the `details` strategy.
#[derive(Debug, Clone)]
pub struct ReportValidator {
    schema: &'static JSONSchema,
    details: Arc<dyn DetailValidator>,
}

impl ReportValidator {
    /// Baseline validator: `details` must be present but may hold any value.
    pub fn new() -> Result<Self, ValidatorError> {
        Ok(Self {
            schema: report_schema()?,
            details: Arc::new(AnyDetails),
        })
    }

    pub fn for_plugin(
        plugin_type: PluginType,
        registry: &DetailRegistry,
    ) -> Result<Self, ValidatorError> {
        Ok(Self {
            schema: report_schema()?,
            details: registry.get(plugin_type),
        })
    }

    /// Lazily built baseline validator shared by every caller.
    pub fn shared() -> Result<&'static Self, ValidatorError> {
        static SHARED: OnceLock<Result<ReportValidator, ValidatorError>> = OnceLock::new();
        SHARED.get_or_init(Self::new).as_ref().map_err(Clone::clone)
    }

    /// Returns every finding for `buf`, sorted by pointer then message. An empty
    /// list means the report is valid.
    pub fn validate(&self, buf: &[u8]) -> Vec<Finding> {
        if let Err(err) = std::str::from_utf8(buf) {
            return vec![Finding::document(format!(
                "invalid UTF-8 (first bad byte at offset {})",
                err.valid_up_to()
            ))];
        }

        let instance: Value = match serde_json::from_slice(buf) {
            Ok(value) => value,
            Err(err) => return vec![Finding::document(format!("invalid JSON: {err}"))],
        };

        let mut findings = schema_findings(self.schema, &instance);

        if instance.get("truncated") == Some(&Value::Bool(true)) {
            findings.push(Finding::new("/truncated", "value must be false"));
        }

        if let Some(details) = instance.get("details") {
            findings.extend(
                self.details
                    .validate(details)
                    .into_iter()
                    .map(|f| f.nested("/details")),
            );
        }

        findings.sort();
        findings
    }
}

fn report_schema() -> Result<&'static JSONSchema, ValidatorError> {
    static SCHEMA: OnceLock<Result<JSONSchema, ValidatorError>> = OnceLock::new();
    SCHEMA
        .get_or_init(|| {
            let value: Value = serde_json::from_str(REPORT_SCHEMA)
                .map_err(|e| ValidatorError::SchemaCompile(e.to_string()))?;
            compile_schema(&value)
        })
        .as_ref()
        .map_err(Clone::clone)
}

pub(crate) fn compile_schema(schema: &Value) -> Result<JSONSchema, ValidatorError> {
    JSONSchema::options()
        .with_draft(Draft::Draft202012)
        .compile(schema)
        .map_err(|e| ValidatorError::SchemaCompile(e.to_string()))
}

pub(crate) fn schema_findings(schema: &JSONSchema, instance: &Value) -> Vec<Finding> {
    let Err(errors) = schema.validate(instance) else {
        return Vec::new();
    };
    let mut findings: Vec<Finding> = errors.map(|e| to_finding(&e)).collect();
    findings.sort();
    findings
}

fn to_finding(error: &ValidationError<'_>) -> Finding {
    let pointer = error.instance_path.to_string();
    let message = match &error.kind {
        ValidationErrorKind::Required { property } => match property.as_str() {
            Some(name) => format!("missing required property '{name}'"),
            None => format!("missing required property {property}"),
        },
        ValidationErrorKind::Type {
            kind: TypeKind::Single(want),
        } => format!("got {}, want {want}", json_kind(&error.instance)),
        _ => error.to_string(),
    };
    Finding::new(pointer, message)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
