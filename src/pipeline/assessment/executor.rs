//! Runs assessment tasks against the LLM.
//!
//! Every task yields an `AssessmentResult`. Transport errors and worker
//! panics become failed results; unparseable responses become default
//! low-confidence entries so each requested attribute still gets a score.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use rayon::prelude::*;
use serde_json::{json, Map, Value};

use crate::config::{ASSESSMENT_CONTEXT, DEFAULT_PARSE_FAILURE_CONFIDENCE};
use crate::llm::{ContentBlock, InvokeRequest, LlmClient};
use crate::models::{AttributeConfig, ConfidenceAlert};
use crate::pipeline_config::{lenient_f64_opt, AssessmentSettings};

use super::geometry::reconcile_geometry;
use super::parser::parse_assessment;
use super::prompt::build_task_content;
use super::types::{AssessmentResult, AssessmentTask, TaskType};

fn default_entry(reason: String) -> Value {
    json!({
        "confidence": DEFAULT_PARSE_FAILURE_CONFIDENCE,
        "confidence_reason": reason,
    })
}

fn parse_failure_reason(name: &str) -> String {
    format!("Unable to parse assessment response for {name} - default score assigned")
}

fn missing_reason(name: &str) -> String {
    format!("No usable assessment returned for {name} - default score assigned")
}

/// Make sure `name` holds an object with a usable `confidence`.
///
/// Non-objects are replaced by a default entry. Objects without a numeric
/// confidence keep their other keys and get the default score and reason.
fn ensure_entry(data: &mut Map<String, Value>, name: &str, reason: impl Fn(&str) -> String) {
    match data.get_mut(name) {
        Some(Value::Object(entry)) => {
            if confidence_of(entry).is_none() {
                tracing::warn!(attribute = %name, "Assessment entry has no usable confidence, assigning default");
                entry.insert("confidence".into(), json!(DEFAULT_PARSE_FAILURE_CONFIDENCE));
                entry.insert("confidence_reason".into(), Value::String(reason(name)));
            }
        }
        Some(_) => {
            tracing::warn!(attribute = %name, "Assessment entry is not an object, replacing");
            data.insert(name.to_string(), default_entry(reason(name)));
        }
        None => {
            data.insert(name.to_string(), default_entry(reason(name)));
        }
    }
}

/// Give every attribute the task is responsible for an assessment entry.
///
/// Simple batches need one entry per attribute, groups one per
/// sub-attribute nested under the group name, list items one per item
/// attribute. Entries that already carry a confidence are left alone.
pub fn fill_defaults(task: &AssessmentTask, data: &mut Map<String, Value>, reason: impl Fn(&str) -> String) {
    match task.task_type {
        TaskType::SimpleBatch => {
            for name in &task.attributes {
                ensure_entry(data, name, &reason);
            }
        }
        TaskType::Group => {
            let Some(group) = task.attributes.first() else {
                return;
            };
            if !data.get(group).is_some_and(Value::is_object) {
                data.insert(group.clone(), Value::Object(Map::new()));
            }
            if let Some(Value::Object(sub)) = data.get_mut(group) {
                for name in task.confidence_thresholds.keys() {
                    ensure_entry(sub, name, &reason);
                }
            }
        }
        TaskType::ListItem => {
            for name in task.confidence_thresholds.keys() {
                ensure_entry(data, name, &reason);
            }
        }
    }
}

fn confidence_of(entry: &Map<String, Value>) -> Option<f64> {
    lenient_f64_opt(entry.get("confidence"))
}

/// Threshold violations for one task's assessment data.
///
/// Paths are `Name`, `Group.Sub` and `List[i].Sub`. Only entries carrying a
/// numeric `confidence` are checked, so every alert matches a value present
/// in the output.
pub fn collect_alerts(
    task: &AssessmentTask,
    data: &Map<String, Value>,
    default_threshold: f64,
) -> Vec<ConfidenceAlert> {
    let mut alerts = Vec::new();
    let mut check = |path: String, name: &str, value: &Value| {
        let Some(confidence) = value.as_object().and_then(confidence_of) else {
            return;
        };
        let threshold = task.threshold_for(name, default_threshold);
        alerts.extend(ConfidenceAlert::check(path, confidence, threshold));
    };

    match task.task_type {
        TaskType::SimpleBatch => {
            for name in &task.attributes {
                if let Some(value) = data.get(name) {
                    check(name.clone(), name, value);
                }
            }
        }
        TaskType::Group => {
            let group = task.attributes.first().map(String::as_str).unwrap_or_default();
            if let Some(Value::Object(subs)) = data.get(group) {
                for (name, value) in subs {
                    check(format!("{group}.{name}"), name, value);
                }
            }
        }
        TaskType::ListItem => {
            let list = task.attributes.first().map(String::as_str).unwrap_or_default();
            let index = task.list_item_index.unwrap_or(0);
            for (name, value) in data {
                check(format!("{list}[{index}].{name}"), name, value);
            }
        }
    }

    alerts
}

/// Shared, read-only inputs for every task of a section.
pub struct TaskExecutor<'a> {
    pub llm: &'a dyn LlmClient,
    pub base_content: &'a [ContentBlock],
    pub attributes: &'a [AttributeConfig],
    pub settings: &'a AssessmentSettings,
}

impl TaskExecutor<'_> {
    /// Assess one task. Never panics on bad model output.
    pub fn process_task(&self, task: &AssessmentTask) -> AssessmentResult {
        let _span = tracing::info_span!("assess_task", task_id = %task.task_id).entered();
        let start = Instant::now();
        let content = build_task_content(task, self.base_content, self.attributes);

        tracing::debug!(
            task_id = %task.task_id,
            attributes = task.attributes.len(),
            blocks = content.len(),
            "Processing assessment task"
        );

        let request = InvokeRequest {
            model_id: &self.settings.model_id,
            system_prompt: &self.settings.system_prompt,
            content: &content,
            params: &self.settings.sampling,
            context: ASSESSMENT_CONTEXT,
        };

        let response = match self.llm.invoke(&request) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(task_id = %task.task_id, error = %e, "Assessment task failed");
                return AssessmentResult::failed(
                    &task.task_id,
                    e.to_string(),
                    start.elapsed().as_secs_f64(),
                );
            }
        };

        let mut data = match parse_assessment(&response.text) {
            Some(mut parsed) => {
                fill_defaults(task, &mut parsed, missing_reason);
                parsed
            }
            None => {
                tracing::error!(
                    task_id = %task.task_id,
                    "Error parsing assessment output, assigning default scores"
                );
                let mut defaults = Map::new();
                fill_defaults(task, &mut defaults, parse_failure_reason);
                defaults
            }
        };

        data = reconcile_geometry(data);
        let confidence_alerts =
            collect_alerts(task, &data, self.settings.default_confidence_threshold);

        AssessmentResult {
            task_id: task.task_id.clone(),
            success: true,
            assessment_data: data,
            confidence_alerts,
            error_message: None,
            processing_time: start.elapsed().as_secs_f64(),
            metering: Some(response.metering),
        }
    }

    /// `process_task` with panics converted into a failed result.
    fn process_isolated(&self, task: &AssessmentTask) -> AssessmentResult {
        let start = Instant::now();
        catch_unwind(AssertUnwindSafe(|| self.process_task(task))).unwrap_or_else(|_| {
            tracing::error!(task_id = %task.task_id, "Assessment task panicked");
            AssessmentResult::failed(
                &task.task_id,
                "task panicked during processing",
                start.elapsed().as_secs_f64(),
            )
        })
    }

    fn run_sequential(&self, tasks: &[AssessmentTask]) -> Vec<AssessmentResult> {
        tasks.iter().map(|t| self.process_isolated(t)).collect()
    }

    /// Run all tasks, on a bounded pool when more than one worker is
    /// configured and there is more than one task. Results come back in
    /// task order either way.
    pub fn run_all(&self, tasks: &[AssessmentTask]) -> Vec<AssessmentResult> {
        let workers = self.settings.granular.max_workers;
        let start = Instant::now();

        let results = if self.settings.granular.parallel() && tasks.len() > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
                Ok(pool) => {
                    tracing::info!(tasks = tasks.len(), workers, "Running assessment tasks in parallel");
                    pool.install(|| tasks.par_iter().map(|t| self.process_isolated(t)).collect())
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to build worker pool, running sequentially");
                    self.run_sequential(tasks)
                }
            }
        } else {
            tracing::info!(tasks = tasks.len(), "Running assessment tasks sequentially");
            self.run_sequential(tasks)
        };

        let failed = results.iter().filter(|r| !r.success).count();
        tracing::info!(
            total = results.len(),
            failed,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Assessment tasks complete"
        );
        results
    }
}
