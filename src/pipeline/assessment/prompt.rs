//! Two-phase prompt construction.
//!
//! The base is built once per section from the task template and shared by
//! every task, so transports that cache prompt prefixes get hits on it.
//! Each task then fills in its own extraction data and attribute
//! descriptions.

use serde_json::{Map, Value};

use crate::config::MAX_PROMPT_IMAGES;
use crate::llm::{ContentBlock, ImageAttachment};
use crate::models::AttributeConfig;

use super::error::AssessmentError;
use super::schema::task_descriptions;
use super::types::{AssessmentTask, TaskType};

pub const DOCUMENT_TEXT: &str = "{DOCUMENT_TEXT}";
pub const DOCUMENT_CLASS: &str = "{DOCUMENT_CLASS}";
pub const OCR_TEXT_CONFIDENCE: &str = "{OCR_TEXT_CONFIDENCE}";
pub const DOCUMENT_IMAGE: &str = "{DOCUMENT_IMAGE}";
pub const EXTRACTION_RESULTS: &str = "{EXTRACTION_RESULTS}";
pub const ATTRIBUTE_NAMES_AND_DESCRIPTIONS: &str = "{ATTRIBUTE_NAMES_AND_DESCRIPTIONS}";
pub const CACHE_POINT: &str = "<<CACHEPOINT>>";

/// Section-level values substituted into the base prompt.
#[derive(Debug, Clone, Copy)]
pub struct BaseInputs<'a> {
    pub document_text: &'a str,
    pub document_class: &'a str,
    pub ocr_text_confidence: &'a str,
    pub images: &'a [ImageAttachment],
}

fn substitute_base(segment: &str, inputs: &BaseInputs<'_>) -> String {
    segment
        .replace(DOCUMENT_TEXT, inputs.document_text)
        .replace(DOCUMENT_CLASS, inputs.document_class)
        .replace(OCR_TEXT_CONFIDENCE, inputs.ocr_text_confidence)
}

/// Append a template segment, turning cache markers into cache-point blocks.
fn push_text(content: &mut Vec<ContentBlock>, segment: &str, inputs: &BaseInputs<'_>) {
    let mut parts = segment.split(CACHE_POINT).peekable();
    while let Some(part) = parts.next() {
        let text = substitute_base(part, inputs);
        if !text.trim().is_empty() {
            content.push(ContentBlock::Text(text));
        }
        if parts.peek().is_some() {
            content.push(ContentBlock::CachePoint);
        }
    }
}

/// Build the cacheable base content.
///
/// `{DOCUMENT_IMAGE}` may appear at most once; when present, page images are
/// placed at that position (capped at the platform limit). Without it the
/// prompt is text-only. `{EXTRACTION_RESULTS}` and
/// `{ATTRIBUTE_NAMES_AND_DESCRIPTIONS}` are left for the task phase.
pub fn build_base_content(
    template: &str,
    inputs: &BaseInputs<'_>,
) -> Result<Vec<ContentBlock>, AssessmentError> {
    if template.trim().is_empty() {
        return Err(AssessmentError::Configuration(
            "assessment task_prompt is required but empty".into(),
        ));
    }

    let occurrences = template.matches(DOCUMENT_IMAGE).count();
    if occurrences > 1 {
        return Err(AssessmentError::Configuration(format!(
            "Invalid {DOCUMENT_IMAGE} placeholder usage: found {occurrences} occurrences, but exactly 1 is required"
        )));
    }

    let mut content = Vec::new();

    match template.split_once(DOCUMENT_IMAGE) {
        Some((before, after)) => {
            push_text(&mut content, before, inputs);

            if inputs.images.len() > MAX_PROMPT_IMAGES {
                tracing::warn!(
                    found = inputs.images.len(),
                    dropped = inputs.images.len() - MAX_PROMPT_IMAGES,
                    "Too many page images, truncating to {MAX_PROMPT_IMAGES}"
                );
            }
            content.extend(
                inputs
                    .images
                    .iter()
                    .take(MAX_PROMPT_IMAGES)
                    .cloned()
                    .map(ContentBlock::Image),
            );

            push_text(&mut content, after, inputs);
        }
        None => push_text(&mut content, template, inputs),
    }

    Ok(content)
}

/// The extraction values a task asks the model to verify, as pretty JSON.
pub fn extraction_results_text(task: &AssessmentTask) -> String {
    match task.task_type {
        TaskType::ListItem => {
            let index = task.list_item_index.unwrap_or(0);
            format!(
                "Item #{}: {:#}",
                index + 1,
                Value::Object(task.extraction_data.clone())
            )
        }
        TaskType::SimpleBatch | TaskType::Group => {
            let scoped: Map<String, Value> = task
                .attributes
                .iter()
                .filter_map(|name| {
                    task.extraction_data
                        .get(name)
                        .map(|v| (name.clone(), v.clone()))
                })
                .collect();
            format!("{:#}", Value::Object(scoped))
        }
    }
}

/// Fill the task placeholders into every text block of the shared base.
/// Blocks left blank are dropped; images and cache points pass through.
pub fn build_task_content(
    task: &AssessmentTask,
    base: &[ContentBlock],
    attributes: &[AttributeConfig],
) -> Vec<ContentBlock> {
    let extraction = extraction_results_text(task);
    let descriptions = task_descriptions(task, attributes);

    base.iter()
        .filter_map(|block| match block {
            ContentBlock::Text(text) => {
                let filled = text
                    .replace(EXTRACTION_RESULTS, &extraction)
                    .replace(ATTRIBUTE_NAMES_AND_DESCRIPTIONS, &descriptions);
                (!filled.trim().is_empty()).then_some(ContentBlock::Text(filled))
            }
            other => Some(other.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ImageFormat;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn inputs<'a>(images: &'a [ImageAttachment]) -> BaseInputs<'a> {
        BaseInputs {
            document_text: "Invoice for Bob",
            document_class: "Invoice",
            ocr_text_confidence: "ocr-data",
            images,
        }
    }

    fn image() -> ImageAttachment {
        ImageAttachment::new(ImageFormat::Png, vec![1])
    }

    fn list_task(index: usize) -> AssessmentTask {
        AssessmentTask {
            task_id: format!("list_Items_item_{index}"),
            task_type: TaskType::ListItem,
            attributes: vec!["Items".into()],
            extraction_data: json!({"Amount": 10}).as_object().cloned().unwrap(),
            confidence_thresholds: BTreeMap::new(),
            list_item_index: Some(index),
        }
    }

    #[test]
    fn substitutes_base_placeholders_and_places_images() {
        let images = vec![image(), image()];
        let template = "Class: {DOCUMENT_CLASS}\n{DOCUMENT_TEXT}\n{DOCUMENT_IMAGE}\nOCR: {OCR_TEXT_CONFIDENCE}\n{EXTRACTION_RESULTS}";
        let content = build_base_content(template, &inputs(&images)).unwrap();

        assert_eq!(content.len(), 4);
        assert_eq!(content[0].as_text(), Some("Class: Invoice\nInvoice for Bob\n"));
        assert!(matches!(content[1], ContentBlock::Image(_)));
        assert!(matches!(content[2], ContentBlock::Image(_)));
        let tail = content[3].as_text().unwrap();
        assert!(tail.contains("OCR: ocr-data"));
        assert!(tail.contains(EXTRACTION_RESULTS));
    }

    #[test]
    fn duplicate_image_placeholder_is_rejected() {
        let err = build_base_content("{DOCUMENT_IMAGE} and {DOCUMENT_IMAGE}", &inputs(&[]))
            .unwrap_err();
        assert!(matches!(err, AssessmentError::Configuration(_)));
        assert!(err.to_string().contains("found 2"));
    }

    #[test]
    fn empty_template_is_rejected() {
        assert!(matches!(
            build_base_content("   ", &inputs(&[])),
            Err(AssessmentError::Configuration(_))
        ));
    }

    #[test]
    fn template_without_image_placeholder_is_text_only() {
        let images = vec![image()];
        let content = build_base_content("Check {DOCUMENT_TEXT}", &inputs(&images)).unwrap();
        assert_eq!(content, vec![ContentBlock::text("Check Invoice for Bob")]);
    }

    #[test]
    fn images_are_capped() {
        let images = vec![image(); 25];
        let content = build_base_content("{DOCUMENT_IMAGE}", &inputs(&images)).unwrap();
        assert_eq!(content.len(), MAX_PROMPT_IMAGES);
    }

    #[test]
    fn cache_marker_becomes_cache_point() {
        let content =
            build_base_content("Doc: {DOCUMENT_TEXT}<<CACHEPOINT>>Verify {EXTRACTION_RESULTS}", &inputs(&[]))
                .unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(content[1], ContentBlock::CachePoint);
    }

    #[test]
    fn list_item_extraction_is_numbered() {
        let text = extraction_results_text(&list_task(1));
        assert!(text.starts_with("Item #2: {"));
        assert!(text.contains("\"Amount\": 10"));
    }

    #[test]
    fn simple_extraction_is_scoped_to_task_attributes() {
        let task = AssessmentTask {
            task_id: "simple_batch_0".into(),
            task_type: TaskType::SimpleBatch,
            attributes: vec!["Name".into()],
            extraction_data: json!({"Name": "Bob", "Other": 1}).as_object().cloned().unwrap(),
            confidence_thresholds: BTreeMap::new(),
            list_item_index: None,
        };
        assert_eq!(extraction_results_text(&task), "{\n  \"Name\": \"Bob\"\n}");
    }

    #[test]
    fn task_content_fills_placeholders_and_keeps_images() {
        let images = vec![image()];
        let base = build_base_content(
            "{DOCUMENT_IMAGE}<<CACHEPOINT>>{ATTRIBUTE_NAMES_AND_DESCRIPTIONS}\n{EXTRACTION_RESULTS}",
            &inputs(&images),
        )
        .unwrap();
        let attrs = vec![AttributeConfig::list(
            "Items",
            "",
            "",
            vec![AttributeConfig::simple("Amount", "Line total")],
        )];

        let content = build_task_content(&list_task(0), &base, &attrs);
        assert!(matches!(content[0], ContentBlock::Image(_)));
        assert_eq!(content[1], ContentBlock::CachePoint);
        let text = content[2].as_text().unwrap();
        assert!(text.starts_with("Amount  \t[ Line total ]"));
        assert!(text.contains("Item #1:"));

        // The shared base is untouched.
        assert!(base[2].as_text().unwrap().contains(EXTRACTION_RESULTS));
    }

    #[test]
    fn blank_blocks_are_dropped_after_substitution() {
        let base = vec![ContentBlock::text("{ATTRIBUTE_NAMES_AND_DESCRIPTIONS}")];
        let content = build_task_content(&list_task(0), &base, &[]);
        assert!(content.is_empty());
    }
}
