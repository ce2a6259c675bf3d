//! Output contract of an experiment analysis.
//!
//! `AnalysisResult` is produced exactly once per request, either from the
//! model's parsed output or from the canned fallback, and never mutated after.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::deserializers::{
    de_properties_forgiving, de_step_number, de_string_forgiving, de_string_list_forgiving,
};

/// Category of experiment the photograph shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentDomain {
    Circuits,
    Chemistry,
    Physics,
    General,
}

impl ExperimentDomain {
    pub const ALL: [ExperimentDomain; 4] = [
        ExperimentDomain::Circuits,
        ExperimentDomain::Chemistry,
        ExperimentDomain::Physics,
        ExperimentDomain::General,
    ];

    /// Total conversion from a request label. Matching is exact; anything
    /// other than the four lowercase labels becomes `General`.
    pub fn from_label(label: &str) -> Self {
        match label {
            "circuits" => ExperimentDomain::Circuits,
            "chemistry" => ExperimentDomain::Chemistry,
            "physics" => ExperimentDomain::Physics,
            _ => ExperimentDomain::General,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentDomain::Circuits => "circuits",
            ExperimentDomain::Chemistry => "chemistry",
            ExperimentDomain::Physics => "physics",
            ExperimentDomain::General => "general",
        }
    }
}

impl fmt::Display for ExperimentDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a safety warning.
///
/// Values outside the four known levels are kept verbatim in `Other` so model
/// output passes through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
    #[serde(untagged)]
    Other(String),
}

impl Severity {
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Severity::Other(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
            Severity::Other(raw) => raw.as_str(),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected physical element of the setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default, deserialize_with = "de_properties_forgiving")]
    pub properties: BTreeMap<String, Value>,
    #[serde(default, deserialize_with = "de_string_forgiving")]
    pub position: String,
    #[serde(default, deserialize_with = "de_string_list_forgiving")]
    pub connections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub severity: Severity,
    pub message: String,
    #[serde(default, deserialize_with = "de_string_forgiving")]
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(deserialize_with = "de_step_number")]
    pub step: u32,
    pub instruction: String,
}

/// Complete structured output of one analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub observations: String,
    pub components: Vec<Component>,
    pub predicted_outcome: String,
    pub safety_warnings: Vec<Warning>,
    pub guidance: Vec<Step>,
    pub confidence_score: f64,
}

impl AnalysisResult {
    /// Check the result against the output contract.
    ///
    /// Returns one message per violation; an empty vector means the result is
    /// well formed.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if !(0.0..=1.0).contains(&self.confidence_score) {
            problems.push(format!(
                "confidence_score {} is outside [0, 1]",
                self.confidence_score
            ));
        }

        for (idx, warning) in self.safety_warnings.iter().enumerate() {
            if !warning.severity.is_recognized() {
                problems.push(format!(
                    "safety_warnings[{}] has unknown severity '{}'",
                    idx, warning.severity
                ));
            }
        }

        for (idx, step) in self.guidance.iter().enumerate() {
            let expected = idx as u32 + 1;
            if step.step != expected {
                problems.push(format!(
                    "guidance[{}] is numbered {} (expected {})",
                    idx, step.step, expected
                ));
            }
        }

        problems
    }

    pub fn is_well_formed(&self) -> bool {
        self.validate().is_empty()
    }
}
