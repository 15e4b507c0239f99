//! Assessment configuration resolved once at service construction.
//!
//! The source mapping is a nested JSON value (`assessment.*`, `classes[]`).
//! Values may arrive as strings ("0.9", "true") because they pass through
//! UI forms and environment overrides, so every scalar is read leniently:
//! unparseable values fall back to the documented default with a warning.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::llm::SamplingParams;
use crate::models::AttributeConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Attribute '{name}' has unknown attributeType '{attribute_type}'")]
    UnknownAttributeType { name: String, attribute_type: String },

    #[error("Invalid class configuration: {0}")]
    InvalidClasses(String),
}

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Parallelism and batching knobs for granular assessment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GranularSettings {
    /// Whether callers should route sections to the granular engine.
    /// Carried for callers only; the service itself never reads it.
    pub enabled: bool,
    /// Worker pool size. 1 = sequential.
    pub max_workers: usize,
    /// Simple attributes per LLM call.
    pub simple_batch_size: usize,
    /// Iteration stride over list items. Each item still gets its own task.
    pub list_batch_size: usize,
}

impl Default for GranularSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_workers: 4,
            simple_batch_size: 3,
            list_batch_size: 1,
        }
    }
}

impl GranularSettings {
    pub fn parallel(&self) -> bool {
        self.max_workers > 1
    }
}

/// Target size for page images. Both must be set for resizing to happen.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageSettings {
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentSettings {
    pub enabled: bool,
    pub granular: GranularSettings,
    pub model_id: String,
    pub system_prompt: String,
    /// Template with `{DOCUMENT_TEXT}`, `{DOCUMENT_CLASS}`, `{OCR_TEXT_CONFIDENCE}`,
    /// `{DOCUMENT_IMAGE}`, `{EXTRACTION_RESULTS}`, `{ATTRIBUTE_NAMES_AND_DESCRIPTIONS}`.
    pub task_prompt: String,
    pub sampling: SamplingParams,
    pub default_confidence_threshold: f64,
    pub image: ImageSettings,
}

impl Default for AssessmentSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            granular: GranularSettings::default(),
            model_id: String::new(),
            system_prompt: String::new(),
            task_prompt: String::new(),
            sampling: SamplingParams::default(),
            default_confidence_threshold: 0.9,
            image: ImageSettings::default(),
        }
    }
}

/// A document class and its attribute schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassConfig {
    pub name: String,
    pub description: String,
    pub attributes: Vec<AttributeConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceConfig {
    pub assessment: AssessmentSettings,
    pub classes: Vec<ClassConfig>,
}

// ═══════════════════════════════════════════════════════════
// Resolution
// ═══════════════════════════════════════════════════════════

impl ServiceConfig {
    /// Resolve settings from the nested configuration mapping.
    pub fn from_value(config: &Value) -> Result<Self, ConfigError> {
        let assessment = config.get("assessment").cloned().unwrap_or(Value::Null);
        let granular = assessment.get("granular").cloned().unwrap_or(Value::Null);
        let image = assessment.get("image").cloned().unwrap_or(Value::Null);

        let defaults = GranularSettings::default();
        let granular = GranularSettings {
            enabled: granular
                .get("enabled")
                .map(normalize_bool)
                .unwrap_or(defaults.enabled),
            max_workers: lenient_usize(granular.get("max_workers"), defaults.max_workers).max(1),
            simple_batch_size: lenient_usize(
                granular.get("simple_batch_size"),
                defaults.simple_batch_size,
            )
            .max(1),
            list_batch_size: lenient_usize(
                granular.get("list_batch_size"),
                defaults.list_batch_size,
            )
            .max(1),
        };

        let model_id = [
            config.get("model_id"),
            assessment.get("model_id"),
            assessment.get("model"),
        ]
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|s| !s.trim().is_empty())
        .unwrap_or_default()
        .to_string();

        let sampling_defaults = SamplingParams::default();
        let sampling = SamplingParams {
            temperature: lenient_f64(assessment.get("temperature"), sampling_defaults.temperature),
            top_k: lenient_f64(assessment.get("top_k"), sampling_defaults.top_k),
            top_p: lenient_f64(assessment.get("top_p"), sampling_defaults.top_p),
            max_tokens: lenient_f64_opt(assessment.get("max_tokens"))
                .filter(|n| *n > 0.0)
                .map(|n| n as u32),
        };

        let assessment = AssessmentSettings {
            enabled: assessment
                .get("enabled")
                .map(normalize_bool)
                .unwrap_or(true),
            granular,
            model_id,
            system_prompt: string_field(&assessment, "system_prompt"),
            task_prompt: string_field(&assessment, "task_prompt"),
            sampling,
            default_confidence_threshold: lenient_f64(
                assessment.get("default_confidence_threshold"),
                0.9,
            ),
            image: ImageSettings {
                target_width: lenient_dimension(image.get("target_width")),
                target_height: lenient_dimension(image.get("target_height")),
            },
        };

        let classes = match config.get("classes") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(parse_class)
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(ConfigError::InvalidClasses(format!(
                    "expected a list, got {other}"
                )))
            }
        };

        Ok(Self {
            assessment,
            classes,
        })
    }

    /// Attribute schema for a class label (case-insensitive); empty if unknown.
    pub fn class_attributes(&self, class_label: &str) -> &[AttributeConfig] {
        self.classes
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(class_label))
            .map(|c| c.attributes.as_slice())
            .unwrap_or(&[])
    }
}

fn parse_class(value: &Value) -> Result<ClassConfig, ConfigError> {
    let attributes = match value.get("attributes") {
        None | Some(Value::Null) => Vec::new(),
        Some(attrs) => serde_json::from_value(attrs.clone())
            .map_err(|e| ConfigError::InvalidClasses(e.to_string()))?,
    };

    Ok(ClassConfig {
        name: string_field(value, "name"),
        description: string_field(value, "description"),
        attributes,
    })
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

// ═══════════════════════════════════════════════════════════
// Lenient scalar conversion
// ═══════════════════════════════════════════════════════════

/// Interpret a config value as a boolean: `"true"`, `"1"`, `"yes"`, `"on"`
/// (any case) are true; other strings are false; numbers are true when non-zero.
pub fn normalize_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on"),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Convert a number or numeric string to `f64`. `None` when absent, blank or unparseable.
pub fn lenient_f64_opt(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(f) => Some(f),
            Err(_) => {
                tracing::warn!(value = %s, "Could not convert string to float");
                None
            }
        },
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => None,
        other => {
            tracing::warn!(value = %other, "Could not convert value to float");
            None
        }
    }
}

pub fn lenient_f64(value: Option<&Value>, default: f64) -> f64 {
    lenient_f64_opt(value).unwrap_or(default)
}

fn lenient_usize(value: Option<&Value>, default: usize) -> usize {
    lenient_f64_opt(value)
        .filter(|f| f.is_finite())
        .map(|f| f.max(0.0) as usize)
        .unwrap_or(default)
}

fn lenient_dimension(value: Option<&Value>) -> Option<u32> {
    lenient_f64_opt(value)
        .filter(|f| f.is_finite() && *f >= 1.0)
        .map(|f| f as u32)
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
