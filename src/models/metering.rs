use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Usage accounting returned alongside LLM responses.
///
/// Keyed by service API (e.g. `GranularAssessment/ollama/llama3.2-vision`),
/// then by unit (`inputTokens`, `outputTokens`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metering(BTreeMap<String, BTreeMap<String, u64>>);

impl Metering {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add `amount` to one unit of one service API.
    pub fn record(&mut self, service_api: &str, unit: &str, amount: u64) {
        *self
            .0
            .entry(service_api.to_string())
            .or_default()
            .entry(unit.to_string())
            .or_insert(0) += amount;
    }

    /// Accumulate another record into this one, summing unit by unit.
    pub fn merge(&mut self, other: &Metering) {
        for (service_api, units) in &other.0 {
            for (unit, amount) in units {
                self.record(service_api, unit, *amount);
            }
        }
    }

    pub fn get(&self, service_api: &str, unit: &str) -> Option<u64> {
        self.0.get(service_api).and_then(|units| units.get(unit)).copied()
    }

    pub fn service_apis(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}
