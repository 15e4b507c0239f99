/// Application-level constants
pub const APP_NAME: &str = "idp-assessment";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Context tag attached to every LLM call made by the granular engine.
/// Also the prefix of the metering keys those calls produce.
pub const ASSESSMENT_CONTEXT: &str = "GranularAssessment";

/// Hard platform limit on image attachments per LLM request.
pub const MAX_PROMPT_IMAGES: usize = 20;

/// Confidence assigned when a model response cannot be parsed.
pub const DEFAULT_PARSE_FAILURE_CONFIDENCE: f64 = 0.5;

/// Default log filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,idp_assessment=debug"
}
