use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};

use crate::imaging::ImagePreparer;
use crate::llm::{ImageAttachment, LlmClient};
use crate::models::{sort_page_ids, Document};
use crate::pipeline_config::ServiceConfig;
use crate::storage::{parse_s3_uri, ObjectStore};

use super::aggregator::aggregate;
use super::decomposer::create_tasks;
use super::error::AssessmentError;
use super::executor::TaskExecutor;
use super::prompt::{build_base_content, BaseInputs};
use super::types::{SectionOutcome, SkipReason};

/// Granular confidence assessment of extracted document sections.
///
/// Collaborators are shared so the service can be cloned cheaply into
/// whatever drives section processing.
#[derive(Clone)]
pub struct GranularAssessmentService {
    config: Arc<ServiceConfig>,
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn ObjectStore>,
    images: Arc<dyn ImagePreparer>,
}

/// Section fields needed after the guards pass.
struct SectionInput {
    section_id: String,
    classification: String,
    page_ids: Vec<String>,
    extraction_result_uri: String,
}

/// Text, images and OCR confidence gathered from a section's pages.
#[derive(Default)]
struct PageContent {
    text: String,
    images: Vec<ImageAttachment>,
    ocr_confidence: String,
}

impl GranularAssessmentService {
    pub fn new(
        config: ServiceConfig,
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn ObjectStore>,
        images: Arc<dyn ImagePreparer>,
    ) -> Self {
        let granular = &config.assessment.granular;
        tracing::info!(
            max_workers = granular.max_workers,
            simple_batch_size = granular.simple_batch_size,
            list_batch_size = granular.list_batch_size,
            parallel = granular.parallel(),
            "Granular assessment service initialized"
        );
        Self {
            config: Arc::new(config),
            llm,
            store,
            images,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Assess one section and write the enhanced extraction back to storage.
    ///
    /// Guard failures are recorded on `document.errors` and reported as
    /// `Rejected`. Any other error is also recorded, then returned.
    pub fn process_document_section(
        &self,
        document: &mut Document,
        section_id: &str,
    ) -> Result<SectionOutcome, AssessmentError> {
        if !self.config.assessment.enabled {
            tracing::info!("Assessment is disabled via configuration");
            return Ok(SectionOutcome::Skipped(SkipReason::AssessmentDisabled));
        }

        let input = match Self::check_section(document, section_id) {
            Ok(input) => input,
            Err(message) => {
                tracing::error!(section_id, "{message}");
                document.errors.push(message.clone());
                return Ok(SectionOutcome::Rejected(message));
            }
        };

        let _span = tracing::info_span!(
            "assess_section",
            doc_id = %document.id,
            section_id = %input.section_id,
            class = %input.classification,
        )
        .entered();

        self.assess_section(document, &input).inspect_err(|e| {
            let message = format!(
                "Error processing granular assessment for section {section_id}: {e}"
            );
            tracing::error!("{message}");
            document.errors.push(message);
        })
    }

    /// Assess every section that has an extraction result, one at a time.
    /// Stops at the first error returned by a section.
    pub fn assess_document(&self, document: &mut Document) -> Result<Vec<SectionOutcome>, AssessmentError> {
        tracing::info!(doc_id = %document.id, "Starting granular assessment for document");

        let candidates: Vec<(String, bool)> = document
            .sections
            .iter()
            .map(|s| (s.section_id.clone(), s.extraction_result_uri.is_some()))
            .collect();

        let mut outcomes = Vec::with_capacity(candidates.len());
        for (section_id, has_extraction) in candidates {
            if !has_extraction {
                tracing::warn!(section_id = %section_id, "Section has no extraction results to assess");
                continue;
            }
            outcomes.push(self.process_document_section(document, &section_id)?);
        }

        tracing::info!(doc_id = %document.id, sections = outcomes.len(), "Completed granular assessment for document");
        Ok(outcomes)
    }

    fn check_section(document: &Document, section_id: &str) -> Result<SectionInput, String> {
        if document.sections.is_empty() {
            return Err("Document has no sections to process".to_string());
        }
        let section = document
            .section(section_id)
            .ok_or_else(|| format!("Section {section_id} not found in document"))?;
        let uri = section
            .extraction_result_uri
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| format!("Section {section_id} has no extraction results to assess"))?;
        if section.page_ids.is_empty() {
            return Err(format!("Section {section_id} has no page IDs"));
        }

        Ok(SectionInput {
            section_id: section.section_id.clone(),
            classification: section.classification.clone(),
            page_ids: sort_page_ids(&section.page_ids),
            extraction_result_uri: uri.to_string(),
        })
    }

    fn assess_section(
        &self,
        document: &mut Document,
        input: &SectionInput,
    ) -> Result<SectionOutcome, AssessmentError> {
        let settings = &self.config.assessment;
        let t0 = Instant::now();

        tracing::info!(
            pages = input.page_ids.len(),
            first_page = %input.page_ids[0],
            last_page = %input.page_ids[input.page_ids.len() - 1],
            "Granular assessing section"
        );

        let mut extraction_data = match self.store.get_json(&input.extraction_result_uri)? {
            Value::Object(map) => map,
            other => {
                return Err(AssessmentError::Configuration(format!(
                    "extraction result at {} is not a JSON object: {other}",
                    input.extraction_result_uri
                )))
            }
        };

        let extraction_results = match extraction_data.get("inference_result") {
            Some(Value::Object(map)) if !map.is_empty() => map.clone(),
            _ => {
                tracing::warn!("No extraction results found for section");
                return Ok(SectionOutcome::Skipped(SkipReason::EmptyExtraction));
            }
        };
        tracing::info!(elapsed_secs = t0.elapsed().as_secs_f64(), "Read extraction results");

        let attributes = self.config.class_attributes(&input.classification);
        let tasks = create_tasks(
            &extraction_results,
            attributes,
            settings.default_confidence_threshold,
            &settings.granular,
        );
        if tasks.is_empty() {
            tracing::warn!("No assessment tasks created for section");
            return Ok(SectionOutcome::Skipped(SkipReason::NoTasks));
        }

        let pages = self.load_pages(document, &input.page_ids)?;
        let base_content = build_base_content(
            &settings.task_prompt,
            &BaseInputs {
                document_text: &pages.text,
                document_class: &input.classification,
                ocr_text_confidence: &pages.ocr_confidence,
                images: &pages.images,
            },
        )?;

        let request_start = Instant::now();
        let executor = TaskExecutor {
            llm: self.llm.as_ref(),
            base_content: &base_content,
            attributes,
            settings,
        };
        let results = executor.run_all(&tasks);
        let assessment_secs = request_start.elapsed().as_secs_f64();

        let aggregated = aggregate(
            &tasks,
            &results,
            &extraction_results,
            settings.default_confidence_threshold,
        );

        let tasks_total = tasks.len();
        let tasks_successful = results.iter().filter(|r| r.success).count();
        let tasks_failed = tasks_total - tasks_successful;

        tracing::info!(
            tasks_successful,
            tasks_total,
            elapsed_secs = assessment_secs,
            "Assessment completed"
        );
        if tasks_failed > 0 {
            let failed: Vec<&str> = results
                .iter()
                .filter(|r| !r.success)
                .map(|r| r.task_id.as_str())
                .collect();
            tracing::warn!(?failed, "Some assessment tasks failed");
        }

        extraction_data.insert(
            "explainability_info".into(),
            Value::Array(vec![Value::Object(aggregated.assessment)]),
        );
        let metadata = extraction_data
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        if let Value::Object(meta) = metadata {
            meta.insert("assessment_time_seconds".into(), json!(assessment_secs));
            meta.insert("granular_assessment_used".into(), json!(true));
            meta.insert("assessment_tasks_total".into(), json!(tasks_total));
            meta.insert("assessment_tasks_successful".into(), json!(tasks_successful));
            meta.insert("assessment_tasks_failed".into(), json!(tasks_failed));
        }

        let (bucket, key) = parse_s3_uri(&input.extraction_result_uri)?;
        self.store
            .write_json(&bucket, &key, &Value::Object(extraction_data))?;

        if let Some(section) = document.section_mut(&input.section_id) {
            section.confidence_threshold_alerts = aggregated.alerts;
        }
        document.metering.merge(&aggregated.metering);

        tracing::info!(
            elapsed_secs = t0.elapsed().as_secs_f64(),
            "Total granular assessment time for section"
        );

        Ok(SectionOutcome::Assessed {
            tasks_total,
            tasks_successful,
            tasks_failed,
        })
    }

    /// Read text, images and OCR confidence for pages in the given order.
    /// Pages missing from the document are recorded as errors and skipped.
    fn load_pages(
        &self,
        document: &mut Document,
        page_ids: &[String],
    ) -> Result<PageContent, AssessmentError> {
        let image_settings = &self.config.assessment.image;
        let mut content = PageContent::default();
        let mut texts = Vec::with_capacity(page_ids.len());

        let t_text = Instant::now();
        for page_id in page_ids {
            let Some(page) = document.pages.get(page_id) else {
                let message = format!("Page {page_id} not found in document");
                tracing::error!("{message}");
                document.errors.push(message);
                continue;
            };

            match page.parsed_text_uri.as_deref() {
                Some(uri) => texts.push(self.store.get_text(uri)?),
                None => tracing::warn!(page_id = %page_id, "Page has no parsed text"),
            }
        }
        content.text = texts.join("\n");
        tracing::info!(elapsed_secs = t_text.elapsed().as_secs_f64(), "Read page text");

        let t_images = Instant::now();
        for page in page_ids.iter().filter_map(|id| document.pages.get(id)) {
            match page.image_uri.as_deref() {
                Some(uri) => content.images.push(self.images.prepare_image(
                    uri,
                    image_settings.target_width,
                    image_settings.target_height,
                )?),
                None => tracing::warn!(page_id = %page.page_id, "Page has no image"),
            }
        }
        tracing::info!(
            images = content.images.len(),
            elapsed_secs = t_images.elapsed().as_secs_f64(),
            "Read page images"
        );

        for (page_id, page) in page_ids
            .iter()
            .filter_map(|id| document.pages.get(id).map(|p| (id, p)))
        {
            let Some(uri) = page.text_confidence_uri.as_deref() else {
                continue;
            };
            match self.store.get_json(uri) {
                Ok(data) => {
                    content
                        .ocr_confidence
                        .push_str(&format!("\n--- Page {page_id} Text Confidence Data ---\n"));
                    content.ocr_confidence.push_str(&format!("{data:#}"));
                }
                Err(e) => {
                    tracing::warn!(page_id = %page_id, error = %e, "Failed to read text confidence data");
                }
            }
        }

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::ImageError;
    use crate::llm::{ContentBlock, ImageFormat, InvokeRequest, LlmError, LlmResponse};
    use crate::models::{Metering, Page, Section};
    use crate::storage::{build_s3_uri, StorageError};
    use std::collections::HashMap;
    use std::sync::Mutex;

    // ═══════════════════════════════════════════
    // Mock collaborators
    // ═══════════════════════════════════════════

    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MemoryStore {
        fn put_json(&self, uri: &str, value: Value) {
            self.objects
                .lock()
                .unwrap()
                .insert(uri.to_string(), serde_json::to_vec(&value).unwrap());
        }

        fn put_text(&self, uri: &str, text: &str) {
            self.objects
                .lock()
                .unwrap()
                .insert(uri.to_string(), text.as_bytes().to_vec());
        }
    }

    impl ObjectStore for MemoryStore {
        fn get_bytes(&self, uri: &str) -> Result<Vec<u8>, StorageError> {
            self.objects
                .lock()
                .unwrap()
                .get(uri)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(uri.to_string()))
        }

        fn write_json(&self, bucket: &str, key: &str, data: &Value) -> Result<(), StorageError> {
            self.put_json(&build_s3_uri(bucket, key), data.clone());
            Ok(())
        }
    }

    /// Answers by matching a key against the task prompt; records prompts.
    struct ScriptedLlm {
        responses: Vec<(&'static str, Result<String, String>)>,
        prompts: Mutex<Vec<Vec<ContentBlock>>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<(&'static str, Result<String, String>)>) -> Self {
            Self {
                responses,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl LlmClient for ScriptedLlm {
        fn invoke(&self, request: &InvokeRequest<'_>) -> Result<LlmResponse, LlmError> {
            self.prompts.lock().unwrap().push(request.content.to_vec());
            let prompt: String = request.content.iter().filter_map(|b| b.as_text()).collect();
            let outcome = self
                .responses
                .iter()
                .find(|(key, _)| prompt.contains(key))
                .map(|(_, r)| r.clone())
                .unwrap_or_else(|| Ok("{}".to_string()));

            let mut metering = Metering::new();
            metering.record("GranularAssessment/mock", "inputTokens", 10);
            match outcome {
                Ok(text) => Ok(LlmResponse { text, metering }),
                Err(msg) => Err(LlmError::Connection(msg)),
            }
        }
    }

    struct StubImages;

    impl ImagePreparer for StubImages {
        fn prepare_image(
            &self,
            uri: &str,
            _w: Option<u32>,
            _h: Option<u32>,
        ) -> Result<ImageAttachment, ImageError> {
            Ok(ImageAttachment::new(ImageFormat::Png, uri.as_bytes().to_vec()))
        }
    }

    const RESULT_URI: &str = "s3://output/doc-1/sections/1/result.json";

    fn config(extra: Value) -> ServiceConfig {
        let mut base = json!({
            "model_id": "mock-model",
            "assessment": {
                "task_prompt": "Class {DOCUMENT_CLASS}\n{DOCUMENT_TEXT}\n{DOCUMENT_IMAGE}\n{OCR_TEXT_CONFIDENCE}<<CACHEPOINT>>{ATTRIBUTE_NAMES_AND_DESCRIPTIONS}\n{EXTRACTION_RESULTS}",
                "granular": {"max_workers": 1}
            },
            "classes": [{
                "name": "Invoice",
                "attributes": [
                    {"name": "Name", "description": "Customer", "confidence_threshold": 0.9},
                    {"name": "Address", "description": "Address", "attributeType": "group",
                     "groupAttributes": [{"name": "City", "description": "City"}]},
                    {"name": "Items", "description": "Lines", "attributeType": "list",
                     "listItemTemplate": {"itemDescription": "Line",
                        "itemAttributes": [{"name": "Amount", "description": "Total", "confidence_threshold": 0.8}]}}
                ]
            }]
        });
        if let (Value::Object(target), Value::Object(patch)) = (&mut base["assessment"], extra) {
            for (k, v) in patch {
                target.insert(k, v);
            }
        }
        ServiceConfig::from_value(&base).unwrap()
    }

    fn document() -> Document {
        let mut pages = std::collections::BTreeMap::new();
        for id in ["2", "1"] {
            pages.insert(
                id.to_string(),
                Page {
                    page_id: id.to_string(),
                    image_uri: Some(format!("s3://input/doc-1/pages/{id}/image.jpg")),
                    parsed_text_uri: Some(format!("s3://input/doc-1/pages/{id}/text.txt")),
                    text_confidence_uri: Some(format!("s3://input/doc-1/pages/{id}/conf.json")),
                    ..Page::default()
                },
            );
        }
        Document {
            id: "doc-1".into(),
            pages,
            sections: vec![Section {
                section_id: "1".into(),
                classification: "Invoice".into(),
                page_ids: vec!["2".into(), "1".into()],
                extraction_result_uri: Some(RESULT_URI.into()),
                ..Section::default()
            }],
            ..Document::default()
        }
    }

    fn store(inference: Value) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        store.put_json(RESULT_URI, json!({"inference_result": inference, "metadata": {"parsing_succeeded": true}}));
        store.put_text("s3://input/doc-1/pages/1/text.txt", "page one");
        store.put_text("s3://input/doc-1/pages/2/text.txt", "page two");
        store.put_json("s3://input/doc-1/pages/1/conf.json", json!({"text": "one", "confidence": 99}));
        store
    }

    fn service(config: ServiceConfig, llm: Arc<ScriptedLlm>, store: Arc<MemoryStore>) -> GranularAssessmentService {
        GranularAssessmentService::new(config, llm, store, Arc::new(StubImages))
    }

    fn written(store: &MemoryStore) -> Value {
        store.get_json(RESULT_URI).unwrap()
    }

    // ═══════════════════════════════════════════
    // Section assessment
    // ═══════════════════════════════════════════

    #[test]
    fn confident_simple_attribute_has_no_alert() {
        let store = store(json!({"Name": "Bob"}));
        let llm = Arc::new(ScriptedLlm::new(vec![(
            "Bob",
            Ok(r#"{"Name": {"confidence": 0.95, "confidence_reason": "clear"}}"#.into()),
        )]));
        let svc = service(config(json!({})), llm, store.clone());
        let mut doc = document();

        let outcome = svc.process_document_section(&mut doc, "1").unwrap();
        assert_eq!(
            outcome,
            SectionOutcome::Assessed { tasks_total: 1, tasks_successful: 1, tasks_failed: 0 }
        );

        let out = written(&store);
        assert_eq!(
            out["explainability_info"][0]["Name"],
            json!({"confidence": 0.95, "confidence_reason": "clear", "confidence_threshold": 0.9})
        );
        assert!(doc.sections[0].confidence_threshold_alerts.is_empty());
        assert_eq!(out["inference_result"]["Name"], "Bob");
    }

    #[test]
    fn unparseable_response_scores_default_and_alerts() {
        let store = store(json!({"Name": "Bob"}));
        let llm = Arc::new(ScriptedLlm::new(vec![("Bob", Ok("not json at all".into()))]));
        let svc = service(config(json!({})), llm, store.clone());
        let mut doc = document();

        svc.process_document_section(&mut doc, "1").unwrap();

        let name = &written(&store)["explainability_info"][0]["Name"];
        assert_eq!(name["confidence"], 0.5);
        assert_eq!(name["confidence_threshold"], 0.9);
        assert!(name["confidence_reason"].as_str().unwrap().starts_with("Unable to parse"));

        let alerts = &doc.sections[0].confidence_threshold_alerts;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].attribute_name, "Name");
    }

    #[test]
    fn nested_shapes_are_preserved_and_covered() {
        let inference = json!({
            "Name": "Bob",
            "Address": {"City": "Springfield"},
            "Items": [{"Amount": 1}, {"Amount": 2}, {"Amount": 3}]
        });
        let store = store(inference.clone());
        let llm = Arc::new(ScriptedLlm::new(vec![
            ("Item #2", Err("throttled".into())),
            ("Item #3", Ok(r#"{"Amount": {"confidence": 0.6, "bbox": [0, 0, 500, 500], "page": 1}}"#.into())),
            ("Springfield", Ok("```json\nbroken".into())),
        ]));
        let mut cfg = config(json!({}));
        cfg.assessment.granular.max_workers = 4;
        let svc = service(cfg, llm, store.clone());
        let mut doc = document();

        let outcome = svc.process_document_section(&mut doc, "1").unwrap();
        assert_eq!(
            outcome,
            SectionOutcome::Assessed { tasks_total: 5, tasks_successful: 4, tasks_failed: 1 }
        );

        let out = written(&store);
        let enhanced = &out["explainability_info"][0];
        let keys: Vec<&String> = enhanced.as_object().unwrap().keys().collect();
        let input_keys: Vec<&String> = inference.as_object().unwrap().keys().collect();
        assert_eq!(keys, input_keys);

        assert_eq!(enhanced["Address"]["City"]["confidence"], 0.5);
        let items = enhanced["Items"].as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1], json!({}));
        assert_eq!(items[2]["Amount"]["geometry"][0]["boundingBox"]["width"], 0.5);
        assert!(items[2]["Amount"].get("bbox").is_none());

        let meta = &out["metadata"];
        assert_eq!(meta["parsing_succeeded"], true);
        assert_eq!(meta["granular_assessment_used"], true);
        assert_eq!(meta["assessment_tasks_total"], 5);
        assert_eq!(meta["assessment_tasks_failed"], 1);
        assert!(meta["assessment_time_seconds"].is_number());

        let alerts: Vec<&str> = doc.sections[0]
            .confidence_threshold_alerts
            .iter()
            .map(|a| a.attribute_name.as_str())
            .collect();
        assert!(alerts.contains(&"Address.City"));
        assert!(alerts.contains(&"Items[2].Amount"));
        assert_eq!(doc.metering.get("GranularAssessment/mock", "inputTokens"), Some(40));
    }

    #[test]
    fn base_prompt_orders_pages_and_includes_ocr() {
        let store = store(json!({"Name": "Bob"}));
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let svc = service(config(json!({})), llm.clone(), store);
        let mut doc = document();

        svc.process_document_section(&mut doc, "1").unwrap();

        let prompts = llm.prompts.lock().unwrap();
        let blocks = &prompts[0];
        let head = blocks[0].as_text().unwrap();
        assert!(head.contains("Class Invoice\npage one\npage two"));
        match (&blocks[1], &blocks[2]) {
            (ContentBlock::Image(a), ContentBlock::Image(b)) => {
                assert!(std::str::from_utf8(&a.bytes).unwrap().contains("/1/"));
                assert!(std::str::from_utf8(&b.bytes).unwrap().contains("/2/"));
            }
            other => panic!("expected two images, got {other:?}"),
        }
        let ocr = blocks[3].as_text().unwrap();
        assert!(ocr.contains("--- Page 1 Text Confidence Data ---"));
        assert!(!ocr.contains("Page 2 Text Confidence"));
        assert_eq!(blocks[4], ContentBlock::CachePoint);
        assert!(blocks[5].as_text().unwrap().contains("Name  \t[ Customer ]"));
    }

    // ═══════════════════════════════════════════
    // Guards and skips
    // ═══════════════════════════════════════════

    #[test]
    fn disabled_assessment_leaves_document_untouched() {
        let store = store(json!({"Name": "Bob"}));
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let svc = service(config(json!({"enabled": "false"})), llm.clone(), store.clone());
        let mut doc = document();

        let outcome = svc.process_document_section(&mut doc, "1").unwrap();
        assert_eq!(outcome, SectionOutcome::Skipped(SkipReason::AssessmentDisabled));
        assert!(llm.prompts.lock().unwrap().is_empty());
        assert!(written(&store).get("explainability_info").is_none());
    }

    #[test]
    fn guard_failures_are_recorded_on_document() {
        let svc = service(config(json!({})), Arc::new(ScriptedLlm::new(vec![])), store(json!({})));

        let mut doc = document();
        let outcome = svc.process_document_section(&mut doc, "9").unwrap();
        assert!(matches!(outcome, SectionOutcome::Rejected(_)));
        assert_eq!(doc.errors, vec!["Section 9 not found in document"]);

        let mut doc = document();
        doc.sections[0].page_ids.clear();
        svc.process_document_section(&mut doc, "1").unwrap();
        assert_eq!(doc.errors, vec!["Section 1 has no page IDs"]);

        let mut doc = document();
        doc.sections[0].extraction_result_uri = None;
        svc.process_document_section(&mut doc, "1").unwrap();
        assert_eq!(doc.errors, vec!["Section 1 has no extraction results to assess"]);
    }

    #[test]
    fn empty_inference_result_is_skipped() {
        let store = store(json!({}));
        let svc = service(config(json!({})), Arc::new(ScriptedLlm::new(vec![])), store);
        let mut doc = document();
        assert_eq!(
            svc.process_document_section(&mut doc, "1").unwrap(),
            SectionOutcome::Skipped(SkipReason::EmptyExtraction)
        );
        assert!(doc.errors.is_empty());
    }

    #[test]
    fn unconfigured_attributes_yield_no_tasks() {
        let store = store(json!({"Unknown": "x"}));
        let svc = service(config(json!({})), Arc::new(ScriptedLlm::new(vec![])), store);
        let mut doc = document();
        assert_eq!(
            svc.process_document_section(&mut doc, "1").unwrap(),
            SectionOutcome::Skipped(SkipReason::NoTasks)
        );
    }

    #[test]
    fn section_without_tasks_skips_before_loading_pages() {
        struct UnreadableImages;

        impl ImagePreparer for UnreadableImages {
            fn prepare_image(
                &self,
                uri: &str,
                _w: Option<u32>,
                _h: Option<u32>,
            ) -> Result<ImageAttachment, ImageError> {
                Err(ImageError::Decode(format!("unreadable {uri}")))
            }
        }

        let svc = GranularAssessmentService::new(
            config(json!({"task_prompt": "{DOCUMENT_IMAGE}{DOCUMENT_IMAGE}"})),
            Arc::new(ScriptedLlm::new(vec![])),
            store(json!({"Unknown": "x"})),
            Arc::new(UnreadableImages),
        );
        let mut doc = document();

        assert_eq!(
            svc.process_document_section(&mut doc, "1").unwrap(),
            SectionOutcome::Skipped(SkipReason::NoTasks)
        );
        assert!(doc.errors.is_empty());
    }

    #[test]
    fn missing_page_is_recorded_and_skipped() {
        let store = store(json!({"Name": "Bob"}));
        let svc = service(config(json!({})), Arc::new(ScriptedLlm::new(vec![])), store);
        let mut doc = document();
        doc.sections[0].page_ids.push("7".into());

        let outcome = svc.process_document_section(&mut doc, "1").unwrap();
        assert!(matches!(outcome, SectionOutcome::Assessed { .. }));
        assert_eq!(doc.errors, vec!["Page 7 not found in document"]);
    }

    #[test]
    fn bad_template_is_recorded_and_returned() {
        let store = store(json!({"Name": "Bob"}));
        let svc = service(
            config(json!({"task_prompt": "{DOCUMENT_IMAGE}{DOCUMENT_IMAGE}"})),
            Arc::new(ScriptedLlm::new(vec![])),
            store,
        );
        let mut doc = document();

        let err = svc.process_document_section(&mut doc, "1").unwrap_err();
        assert!(matches!(err, AssessmentError::Configuration(_)));
        assert_eq!(doc.errors.len(), 1);
        assert!(doc.errors[0].starts_with("Error processing granular assessment for section 1"));
    }

    #[test]
    fn missing_extraction_object_propagates() {
        let svc = service(
            config(json!({})),
            Arc::new(ScriptedLlm::new(vec![])),
            Arc::new(MemoryStore::default()),
        );
        let mut doc = document();
        let err = svc.process_document_section(&mut doc, "1").unwrap_err();
        assert!(matches!(err, AssessmentError::Storage(StorageError::NotFound(_))));
        assert_eq!(doc.errors.len(), 1);
    }

    #[test]
    fn assess_document_skips_sections_without_extraction() {
        let store = store(json!({"Name": "Bob"}));
        let svc = service(config(json!({})), Arc::new(ScriptedLlm::new(vec![])), store);
        let mut doc = document();
        doc.sections.push(Section {
            section_id: "2".into(),
            classification: "Invoice".into(),
            page_ids: vec!["1".into()],
            ..Section::default()
        });

        let outcomes = svc.assess_document(&mut doc).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(doc.errors.is_empty());
    }
}
