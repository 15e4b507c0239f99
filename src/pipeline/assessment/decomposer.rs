//! Splits a section's extraction results into independent assessment tasks.
//!
//! Order is simple batches, then groups, then list items, each in
//! configuration order. Simple and group tasks share one running counter;
//! list item tasks are named after their attribute and index.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::models::{AttributeConfig, AttributeKind};
use crate::pipeline_config::GranularSettings;

use super::schema::threshold_for;
use super::types::{AssessmentTask, TaskType};

fn thresholds_for(
    children: &[AttributeConfig],
    all: &[AttributeConfig],
    default_threshold: f64,
) -> BTreeMap<String, f64> {
    children
        .iter()
        .map(|c| (c.name.clone(), threshold_for(&c.name, all, default_threshold)))
        .collect()
}

/// Build the task list for one section.
///
/// Attributes missing from `extraction_results` are never assessed. A list
/// attribute whose value is not an array is skipped with a warning.
/// `list_batch_size` only sets the iteration stride: every list item
/// always gets its own task.
pub fn create_tasks(
    extraction_results: &Map<String, Value>,
    attributes: &[AttributeConfig],
    default_threshold: f64,
    settings: &GranularSettings,
) -> Vec<AssessmentTask> {
    let present: Vec<&AttributeConfig> = attributes
        .iter()
        .filter(|a| extraction_results.contains_key(&a.name))
        .collect();

    let simple: Vec<&AttributeConfig> = present
        .iter()
        .copied()
        .filter(|a| matches!(a.kind, AttributeKind::Simple))
        .collect();

    let mut tasks = Vec::new();
    let mut counter = 0usize;

    for batch in simple.chunks(settings.simple_batch_size.max(1)) {
        let names: Vec<String> = batch.iter().map(|a| a.name.clone()).collect();
        let confidence_thresholds = names
            .iter()
            .map(|n| (n.clone(), threshold_for(n, attributes, default_threshold)))
            .collect();
        let extraction_data = names
            .iter()
            .filter_map(|n| extraction_results.get(n).map(|v| (n.clone(), v.clone())))
            .collect();

        tasks.push(AssessmentTask {
            task_id: format!("simple_batch_{counter}"),
            task_type: TaskType::SimpleBatch,
            attributes: names,
            extraction_data,
            confidence_thresholds,
            list_item_index: None,
        });
        counter += 1;
    }

    for group in present
        .iter()
        .filter(|a| matches!(a.kind, AttributeKind::Group { .. }))
    {
        let mut extraction_data = Map::new();
        if let Some(value) = extraction_results.get(&group.name) {
            extraction_data.insert(group.name.clone(), value.clone());
        }

        tasks.push(AssessmentTask {
            task_id: format!("group_{counter}"),
            task_type: TaskType::Group,
            attributes: vec![group.name.clone()],
            extraction_data,
            confidence_thresholds: thresholds_for(group.children(), attributes, default_threshold),
            list_item_index: None,
        });
        counter += 1;
    }

    for list in present
        .iter()
        .filter(|a| matches!(a.kind, AttributeKind::List { .. }))
    {
        let Some(items) = extraction_results.get(&list.name).and_then(Value::as_array) else {
            tracing::warn!(attribute = %list.name, "List attribute is not a list, skipping");
            continue;
        };

        let thresholds = thresholds_for(list.children(), attributes, default_threshold);
        let stride = settings.list_batch_size.max(1);

        for start in (0..items.len()).step_by(stride) {
            let end = (start + stride).min(items.len());
            for (index, item) in items.iter().enumerate().take(end).skip(start) {
                let extraction_data = match item {
                    Value::Object(map) => map.clone(),
                    other => {
                        let mut wrapped = Map::new();
                        wrapped.insert(list.name.clone(), other.clone());
                        wrapped
                    }
                };

                tasks.push(AssessmentTask {
                    task_id: format!("list_{}_item_{index}", list.name),
                    task_type: TaskType::ListItem,
                    attributes: vec![list.name.clone()],
                    extraction_data,
                    confidence_thresholds: thresholds.clone(),
                    list_item_index: Some(index),
                });
            }
        }
    }

    let count = |t: TaskType| tasks.iter().filter(|task| task.task_type == t).count();
    tracing::info!(
        total = tasks.len(),
        simple_batches = count(TaskType::SimpleBatch),
        groups = count(TaskType::Group),
        list_items = count(TaskType::ListItem),
        "Created assessment tasks"
    );

    tasks
}
