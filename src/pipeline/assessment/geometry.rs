//! Bounding-box reconciliation for assessment trees.
//!
//! Models report evidence locations as `bbox: [x1, y1, x2, y2]` on a
//! 0-1000 scale plus a `page` number. Leaves (objects carrying
//! `confidence`) get a fractional `geometry` list instead, and the raw
//! `bbox`/`page` keys are always removed, converted or not.

use serde_json::{json, Map, Value};
use thiserror::Error;

const BBOX_SCALE: f64 = 1000.0;

#[derive(Error, Debug, PartialEq)]
pub enum GeometryError {
    #[error("expected 4 numeric coordinates, got {0}")]
    InvalidBbox(String),

    #[error("page must be an integer, got {0}")]
    InvalidPage(String),
}

/// Convert a raw `bbox`/`page` pair into a geometry record.
pub fn bbox_to_geometry(bbox: &Value, page: &Value) -> Result<Value, GeometryError> {
    let coords: Option<Vec<f64>> = bbox
        .as_array()
        .and_then(|items| items.iter().map(Value::as_f64).collect());
    let Some(&[x1, y1, x2, y2]) = coords.as_deref() else {
        return Err(GeometryError::InvalidBbox(bbox.to_string()));
    };

    let page = page
        .as_i64()
        .ok_or_else(|| GeometryError::InvalidPage(page.to_string()))?;

    let (left, right) = (x1.min(x2), x1.max(x2));
    let (top, bottom) = (y1.min(y2), y1.max(y2));

    Ok(json!({
        "boundingBox": {
            "top": top / BBOX_SCALE,
            "left": left / BBOX_SCALE,
            "width": (right - left) / BBOX_SCALE,
            "height": (bottom - top) / BBOX_SCALE,
        },
        "page": page,
    }))
}

fn reconcile_leaf(path: &str, mut leaf: Map<String, Value>) -> Map<String, Value> {
    let bbox = leaf.remove("bbox");
    let page = leaf.remove("page");

    match (bbox, page) {
        (Some(bbox), Some(page)) => match bbox_to_geometry(&bbox, &page) {
            Ok(geometry) => {
                tracing::debug!(attribute = %path, "Converted bounding box to geometry");
                leaf.insert("geometry".into(), Value::Array(vec![geometry]));
            }
            Err(e) => {
                tracing::warn!(attribute = %path, error = %e, "Invalid bounding box, dropping");
            }
        },
        (Some(_), None) => {
            tracing::warn!(attribute = %path, "Found bbox without page, removing incomplete data");
        }
        (None, Some(_)) => {
            tracing::warn!(attribute = %path, "Found page without bbox, removing incomplete data");
        }
        (None, None) => {}
    }
    leaf
}

fn reconcile_value(path: &str, value: Value) -> Value {
    match value {
        Value::Object(map) if map.contains_key("confidence") => {
            Value::Object(reconcile_leaf(path, map))
        }
        Value::Object(map) => Value::Object(reconcile_map(path, map)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| reconcile_value(&format!("{path}[{i}]"), item))
                .collect(),
        ),
        other => other,
    }
}

fn reconcile_map(prefix: &str, data: Map<String, Value>) -> Map<String, Value> {
    data.into_iter()
        .map(|(key, value)| {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            let value = reconcile_value(&path, value);
            (key, value)
        })
        .collect()
}

/// Walk an assessment tree and convert every leaf's bbox/page pair.
/// Running it on its own output changes nothing.
pub fn reconcile_geometry(data: Map<String, Value>) -> Map<String, Value> {
    reconcile_map("", data)
}
