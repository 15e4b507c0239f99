//! Granular confidence assessment.
//!
//! A section's extraction results are split into small tasks (batches of
//! simple attributes, whole groups, single list items), each task is
//! scored by the LLM against a shared cacheable prompt, and the results
//! are merged back into the shape of the extraction.
//!
//! ```text
//! extraction ─▶ decomposer ─▶ executor (rayon pool) ─▶ aggregator ─▶ storage
//!                                │
//!                      prompt ◀──┴──▶ parser ─▶ geometry
//! ```

pub mod aggregator;
pub mod decomposer;
pub mod error;
pub mod executor;
pub mod geometry;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod schema;
pub mod types;

pub use aggregator::{aggregate, AggregatedAssessment};
pub use decomposer::create_tasks;
pub use error::AssessmentError;
pub use executor::TaskExecutor;
pub use orchestrator::GranularAssessmentService;
pub use parser::extract_json_from_text;
pub use types::{AssessmentResult, AssessmentTask, SectionOutcome, SkipReason, TaskType};
