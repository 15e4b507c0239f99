use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::alert::ConfidenceAlert;
use super::metering::Metering;

/// A single page and the storage locations of its derived artifacts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Page {
    pub page_id: String,
    pub image_uri: Option<String>,
    /// Unparsed OCR output. Carried for callers; assessment reads `parsed_text_uri`.
    pub raw_text_uri: Option<String>,
    pub parsed_text_uri: Option<String>,
    pub text_confidence_uri: Option<String>,
}

/// A contiguous page range classified as one document class.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Section {
    pub section_id: String,
    pub classification: String,
    pub page_ids: Vec<String>,
    pub extraction_result_uri: Option<String>,
    #[serde(default)]
    pub confidence_threshold_alerts: Vec<ConfidenceAlert>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub pages: BTreeMap<String, Page>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub metering: Metering,
}

impl Document {
    pub fn section(&self, section_id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.section_id == section_id)
    }

    pub fn section_mut(&mut self, section_id: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.section_id == section_id)
    }
}

/// Sort page IDs by page number.
///
/// Numeric IDs sort numerically; anything non-numeric sorts after them.
pub fn sort_page_ids(page_ids: &[String]) -> Vec<String> {
    let mut sorted = page_ids.to_vec();
    sorted.sort_by_key(|id| (id.trim().parse::<u64>().unwrap_or(u64::MAX), id.clone()));
    sorted
}
