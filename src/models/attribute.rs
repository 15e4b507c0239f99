//! Attribute schema for a document class.
//!
//! Configuration arrives as `{name, description, attributeType, ...}` objects.
//! `attributeType` selects the shape: `simple` (scalar), `group` (nested
//! record with `groupAttributes`) or `list` (repeated record described by
//! `listItemTemplate.itemAttributes`). Nesting is one level deep.

use serde::{Deserialize, Serialize};

use crate::pipeline_config::{lenient_f64_opt, ConfigError};

/// A configured attribute of a document class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAttribute", into = "RawAttribute")]
pub struct AttributeConfig {
    pub name: String,
    pub description: String,
    /// Per-attribute override of the default confidence threshold.
    pub confidence_threshold: Option<f64>,
    pub kind: AttributeKind,
}

/// Shape of an attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    Simple,
    Group {
        attributes: Vec<AttributeConfig>,
    },
    List {
        item_description: String,
        item_attributes: Vec<AttributeConfig>,
    },
}

impl AttributeConfig {
    pub fn simple(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            confidence_threshold: None,
            kind: AttributeKind::Simple,
        }
    }

    pub fn group(name: &str, description: &str, attributes: Vec<AttributeConfig>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            confidence_threshold: None,
            kind: AttributeKind::Group { attributes },
        }
    }

    pub fn list(
        name: &str,
        description: &str,
        item_description: &str,
        item_attributes: Vec<AttributeConfig>,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            confidence_threshold: None,
            kind: AttributeKind::List {
                item_description: item_description.to_string(),
                item_attributes,
            },
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = Some(threshold);
        self
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            AttributeKind::Simple => "simple",
            AttributeKind::Group { .. } => "group",
            AttributeKind::List { .. } => "list",
        }
    }

    /// Sub-attributes for groups and list items; empty for simple attributes.
    pub fn children(&self) -> &[AttributeConfig] {
        match &self.kind {
            AttributeKind::Simple => &[],
            AttributeKind::Group { attributes } => attributes,
            AttributeKind::List {
                item_attributes, ..
            } => item_attributes,
        }
    }
}

// ═══════════════════════════════════════════
// Wire format
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawListTemplate {
    #[serde(rename = "itemDescription", default)]
    item_description: String,
    #[serde(rename = "itemAttributes", default)]
    item_attributes: Vec<AttributeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawAttribute {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "attributeType", default, skip_serializing_if = "Option::is_none")]
    attribute_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confidence_threshold: Option<serde_json::Value>,
    #[serde(rename = "groupAttributes", default, skip_serializing_if = "Option::is_none")]
    group_attributes: Option<Vec<AttributeConfig>>,
    #[serde(rename = "listItemTemplate", default, skip_serializing_if = "Option::is_none")]
    list_item_template: Option<RawListTemplate>,
}

impl TryFrom<RawAttribute> for AttributeConfig {
    type Error = ConfigError;

    fn try_from(raw: RawAttribute) -> Result<Self, Self::Error> {
        let kind = match raw.attribute_type.as_deref().unwrap_or("simple") {
            "simple" => AttributeKind::Simple,
            "group" => AttributeKind::Group {
                attributes: raw.group_attributes.unwrap_or_default(),
            },
            "list" => {
                let template = raw.list_item_template.unwrap_or_default();
                AttributeKind::List {
                    item_description: template.item_description,
                    item_attributes: template.item_attributes,
                }
            }
            other => {
                return Err(ConfigError::UnknownAttributeType {
                    name: raw.name,
                    attribute_type: other.to_string(),
                })
            }
        };

        Ok(Self {
            confidence_threshold: lenient_f64_opt(raw.confidence_threshold.as_ref()),
            name: raw.name,
            description: raw.description,
            kind,
        })
    }
}

impl From<AttributeConfig> for RawAttribute {
    fn from(attr: AttributeConfig) -> Self {
        let attribute_type = Some(attr.type_name().to_string());
        let (group_attributes, list_item_template) = match attr.kind {
            AttributeKind::Simple => (None, None),
            AttributeKind::Group { attributes } => (Some(attributes), None),
            AttributeKind::List {
                item_description,
                item_attributes,
            } => (
                None,
                Some(RawListTemplate {
                    item_description,
                    item_attributes,
                }),
            ),
        };

        Self {
            name: attr.name,
            description: attr.description,
            attribute_type,
            confidence_threshold: attr.confidence_threshold.map(serde_json::Value::from),
            group_attributes,
            list_item_template,
        }
    }
}
