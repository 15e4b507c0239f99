use serde::{Deserialize, Serialize};

/// A leaf attribute whose assessed confidence fell below its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceAlert {
    /// Dotted/bracket path: `Name`, `Address.City`, `Items[2].Amount`.
    pub attribute_name: String,
    pub confidence: f64,
    pub confidence_threshold: f64,
}

impl ConfidenceAlert {
    /// Build an alert when `confidence < threshold`.
    pub fn check(attribute_name: String, confidence: f64, threshold: f64) -> Option<Self> {
        (confidence < threshold).then_some(Self {
            attribute_name,
            confidence,
            confidence_threshold: threshold,
        })
    }
}
