//! Attribute schema lookups and prompt-facing descriptions.
//!
//! Lookups search top-level attributes first, then every group's
//! sub-attributes, then every list item template. First match wins.

use crate::models::{AttributeConfig, AttributeKind};

use super::types::{AssessmentTask, TaskType};

/// Find an attribute by name across all nesting levels.
pub fn find_attribute<'a>(name: &str, attributes: &'a [AttributeConfig]) -> Option<&'a AttributeConfig> {
    if let Some(attr) = attributes.iter().find(|a| a.name == name) {
        return Some(attr);
    }

    let groups = attributes
        .iter()
        .filter(|a| matches!(a.kind, AttributeKind::Group { .. }));
    let lists = attributes
        .iter()
        .filter(|a| matches!(a.kind, AttributeKind::List { .. }));

    groups
        .chain(lists)
        .flat_map(|a| a.children())
        .find(|child| child.name == name)
}

/// Confidence threshold for a leaf attribute, or `default` when the
/// attribute is unknown or carries no override.
pub fn threshold_for(name: &str, attributes: &[AttributeConfig], default: f64) -> f64 {
    find_attribute(name, attributes)
        .and_then(|a| a.confidence_threshold)
        .unwrap_or(default)
}

fn push_line(lines: &mut Vec<String>, indent: &str, name: &str, description: &str) {
    lines.push(format!("{indent}{name}  \t[ {description} ]"));
}

/// Render `name [ description ]` lines, one level into groups and lists.
pub fn format_descriptions<'a>(attributes: impl IntoIterator<Item = &'a AttributeConfig>) -> String {
    let mut lines = Vec::new();

    for attr in attributes {
        push_line(&mut lines, "", &attr.name, &attr.description);
        match &attr.kind {
            AttributeKind::Simple => {}
            AttributeKind::Group { attributes } => {
                for sub in attributes {
                    push_line(&mut lines, "  - ", &sub.name, &sub.description);
                }
            }
            AttributeKind::List {
                item_description,
                item_attributes,
            } => {
                if !item_description.is_empty() {
                    lines.push(format!("  Each item: {item_description}"));
                }
                for sub in item_attributes {
                    push_line(&mut lines, "  - ", &sub.name, &sub.description);
                }
            }
        }
    }

    lines.join("\n")
}

/// Descriptions scoped to a single task.
///
/// Simple batches list their own attributes, groups render the whole group,
/// list items render only the item template's attributes.
pub fn task_descriptions(task: &AssessmentTask, attributes: &[AttributeConfig]) -> String {
    match task.task_type {
        TaskType::SimpleBatch => format_descriptions(
            attributes
                .iter()
                .filter(|a| task.attributes.iter().any(|n| n == &a.name)),
        ),
        TaskType::Group => task
            .attributes
            .first()
            .and_then(|name| attributes.iter().find(|a| &a.name == name))
            .map(|group| format_descriptions([group]))
            .unwrap_or_default(),
        TaskType::ListItem => task
            .attributes
            .first()
            .and_then(|name| attributes.iter().find(|a| &a.name == name))
            .map(|list| format_descriptions(list.children()))
            .unwrap_or_default(),
    }
}
