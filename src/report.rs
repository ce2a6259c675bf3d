//! Plain-text rendering of an analysis for the command line.

use std::fmt::Write as _;

use crate::schemas::AnalysisResult;

const RULE_WIDTH: usize = 60;

pub fn render_report(result: &AnalysisResult) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "{rule}\nANALYSIS RESULTS\n{rule}\n");
    let _ = writeln!(
        out,
        "Confidence Score: {:.1}%\n",
        result.confidence_score * 100.0
    );

    if !result.observations.is_empty() {
        let _ = writeln!(out, "OBSERVATIONS:\n  {}\n", result.observations);
    }

    if !result.components.is_empty() {
        let _ = writeln!(out, "COMPONENTS DETECTED ({}):", result.components.len());
        for (idx, component) in result.components.iter().enumerate() {
            let _ = writeln!(out, "\n  {}. {}", idx + 1, component.component_type);
            for (key, value) in &component.properties {
                match value.as_str() {
                    Some(text) => {
                        let _ = writeln!(out, "     - {}: {}", key, text);
                    }
                    None => {
                        let _ = writeln!(out, "     - {}: {}", key, value);
                    }
                }
            }
            if !component.position.is_empty() {
                let _ = writeln!(out, "     - Position: {}", component.position);
            }
            if !component.connections.is_empty() {
                let _ = writeln!(
                    out,
                    "     - Connections: {}",
                    component.connections.join(", ")
                );
            }
        }
        out.push('\n');
    }

    if !result.predicted_outcome.is_empty() {
        let _ = writeln!(out, "PREDICTED OUTCOME:\n  {}\n", result.predicted_outcome);
    }

    if !result.safety_warnings.is_empty() {
        let _ = writeln!(out, "SAFETY WARNINGS ({}):", result.safety_warnings.len());
        for (idx, warning) in result.safety_warnings.iter().enumerate() {
            let _ = writeln!(
                out,
                "\n  {}. [{}] {}",
                idx + 1,
                warning.severity.as_str().to_uppercase(),
                warning.message
            );
            if !warning.recommendation.is_empty() {
                let _ = writeln!(out, "     → {}", warning.recommendation);
            }
        }
        out.push('\n');
    }

    if !result.guidance.is_empty() {
        let _ = writeln!(out, "STEP-BY-STEP GUIDANCE:");
        for step in &result.guidance {
            let _ = writeln!(out, "  {}. {}", step.step, step.instruction);
        }
        out.push('\n');
    }

    out.push_str(&rule);
    out.push('\n');
    out
}

/// One-line summary: component, warning and step counts plus confidence.
pub fn render_summary(label: &str, result: &AnalysisResult) -> String {
    format!(
        "{}: {} components, {} warnings, {} guidance steps, confidence {:.0}%",
        label,
        result.components.len(),
        result.safety_warnings.len(),
        result.guidance.len(),
        result.confidence_score * 100.0
    )
}
