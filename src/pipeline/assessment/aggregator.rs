//! Merges per-task results back into the section's extraction shape.
//!
//! Tasks are walked in creation order and results are looked up by
//! `task_id`, so the merged output does not depend on completion order.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::models::{ConfidenceAlert, Metering};

use super::types::{AssessmentResult, AssessmentTask, TaskType};

/// Index-addressed list builder. Slots may be filled in any order; gaps
/// become empty objects when finished.
#[derive(Debug, Default, Clone)]
pub struct SparseSequence {
    slots: BTreeMap<usize, Value>,
    min_len: usize,
}

impl SparseSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, index: usize, value: Value) {
        self.slots.insert(index, value);
    }

    /// Guarantee the finished sequence is at least `len` long.
    pub fn reserve_len(&mut self, len: usize) {
        self.min_len = self.min_len.max(len);
    }

    pub fn len(&self) -> usize {
        let highest = self.slots.keys().next_back().map_or(0, |i| i + 1);
        highest.max(self.min_len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn finish(mut self) -> Vec<Value> {
        (0..self.len())
            .map(|i| {
                self.slots
                    .remove(&i)
                    .unwrap_or_else(|| Value::Object(Map::new()))
            })
            .collect()
    }
}

/// Merged assessment for one section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedAssessment {
    pub assessment: Map<String, Value>,
    pub alerts: Vec<ConfidenceAlert>,
    pub metering: Metering,
}

/// Copy of an entry with its threshold injected.
fn with_threshold(entry: &Map<String, Value>, threshold: f64) -> Value {
    let mut enhanced = entry.clone();
    enhanced.insert("confidence_threshold".into(), Value::from(threshold));
    Value::Object(enhanced)
}

/// Threshold-inject every object entry of `data`; other values are copied as-is.
fn enhance_entries(
    data: &Map<String, Value>,
    task: &AssessmentTask,
    default_threshold: f64,
    path: impl Fn(&str) -> String,
) -> Map<String, Value> {
    data.iter()
        .map(|(name, value)| {
            let enhanced = match value {
                Value::Object(entry) => with_threshold(entry, task.threshold_for(name, default_threshold)),
                other => {
                    tracing::warn!(attribute = %path(name), "Unexpected assessment data type, copying as-is");
                    other.clone()
                }
            };
            (name.clone(), enhanced)
        })
        .collect()
}

/// Merge task results into one enhanced assessment.
///
/// Failed or missing results are skipped with a warning. List attributes
/// are padded to the length of their extracted value so the output keeps
/// the input's shape even when some or all items failed.
pub fn aggregate(
    tasks: &[AssessmentTask],
    results: &[AssessmentResult],
    extraction_results: &Map<String, Value>,
    default_threshold: f64,
) -> AggregatedAssessment {
    let by_id: HashMap<&str, &AssessmentResult> =
        results.iter().map(|r| (r.task_id.as_str(), r)).collect();

    let mut assessment = Map::new();
    let mut alerts = Vec::new();
    let mut metering = Metering::new();
    let mut lists: BTreeMap<String, SparseSequence> = BTreeMap::new();

    for task in tasks {
        if task.task_type == TaskType::ListItem {
            if let Some(list) = task.attributes.first() {
                lists.entry(list.clone()).or_default();
            }
        }

        let Some(result) = by_id.get(task.task_id.as_str()).filter(|r| r.success) else {
            tracing::warn!(task_id = %task.task_id, "Task failed or missing result");
            continue;
        };

        if let Some(m) = &result.metering {
            metering.merge(m);
        }
        alerts.extend(result.confidence_alerts.iter().cloned());

        let data = &result.assessment_data;
        match task.task_type {
            TaskType::SimpleBatch => {
                for name in &task.attributes {
                    match data.get(name) {
                        Some(Value::Object(entry)) => {
                            let threshold = task.threshold_for(name, default_threshold);
                            assessment.insert(name.clone(), with_threshold(entry, threshold));
                        }
                        Some(_) => {
                            tracing::warn!(attribute = %name, "Unexpected assessment data type, skipping");
                        }
                        None => {}
                    }
                }
            }
            TaskType::Group => {
                let Some(group) = task.attributes.first() else {
                    continue;
                };
                match data.get(group) {
                    Some(Value::Object(subs)) => {
                        let merged = enhance_entries(subs, task, default_threshold, |sub| {
                            format!("{group}.{sub}")
                        });
                        assessment.insert(group.clone(), Value::Object(merged));
                    }
                    Some(_) => {
                        tracing::warn!(attribute = %group, "Unexpected group assessment data type, skipping");
                    }
                    None => {}
                }
            }
            TaskType::ListItem => {
                let Some(list) = task.attributes.first() else {
                    continue;
                };
                let index = task.list_item_index.unwrap_or(0);
                let item = enhance_entries(data, task, default_threshold, |sub| {
                    format!("{list}[{index}].{sub}")
                });
                lists
                    .entry(list.clone())
                    .or_default()
                    .set(index, Value::Object(item));
            }
        }
    }

    for (name, mut items) in lists {
        if let Some(Value::Array(input)) = extraction_results.get(&name) {
            items.reserve_len(input.len());
        }
        assessment.insert(name, Value::Array(items.finish()));
    }

    tracing::debug!(
        attributes = assessment.len(),
        alerts = alerts.len(),
        "Aggregated assessment results"
    );

    AggregatedAssessment {
        assessment,
        alerts,
        metering,
    }
}
