use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{ConfidenceAlert, Metering};

/// How a task's attributes map back into the section's extraction shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Several top-level scalar attributes.
    SimpleBatch,
    /// One group attribute and all its sub-attributes.
    Group,
    /// One element of a list attribute.
    ListItem,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SimpleBatch => "simple_batch",
            Self::Group => "group",
            Self::ListItem => "list_item",
        }
    }
}

/// A unit of assessment work, created once per section run and consumed once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentTask {
    pub task_id: String,
    pub task_type: TaskType,
    /// Attribute names in scope. For list items this is the list attribute.
    pub attributes: Vec<String>,
    /// Extracted values under assessment. For list items, the item itself.
    pub extraction_data: Map<String, Value>,
    /// Leaf attribute name -> threshold.
    pub confidence_thresholds: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_item_index: Option<usize>,
}

impl AssessmentTask {
    pub fn threshold_for(&self, name: &str, default: f64) -> f64 {
        self.confidence_thresholds
            .get(name)
            .copied()
            .unwrap_or(default)
    }
}

/// Outcome of one task. Failed results carry no data and are dropped
/// during aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub task_id: String,
    pub success: bool,
    pub assessment_data: Map<String, Value>,
    pub confidence_alerts: Vec<ConfidenceAlert>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Seconds spent on this task.
    pub processing_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metering: Option<Metering>,
}

impl AssessmentResult {
    pub fn failed(task_id: &str, message: impl Into<String>, processing_time: f64) -> Self {
        Self {
            task_id: task_id.to_string(),
            success: false,
            assessment_data: Map::new(),
            confidence_alerts: Vec::new(),
            error_message: Some(message.into()),
            processing_time,
            metering: None,
        }
    }
}

/// Why a section was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AssessmentDisabled,
    EmptyExtraction,
    NoTasks,
}

/// Terminal state of `process_document_section`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionOutcome {
    Assessed {
        tasks_total: usize,
        tasks_successful: usize,
        tasks_failed: usize,
    },
    Skipped(SkipReason),
    /// A guard failed; the message was also appended to `document.errors`.
    Rejected(String),
}
