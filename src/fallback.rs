//! Canned analyses served whenever the model path cannot produce a result.
//!
//! The content is illustrative, not measured. It exists so every request gets
//! a structurally valid answer. Only circuits, chemistry and physics have
//! their own example; everything else, `general` included, gets circuits.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::schemas::{AnalysisResult, Component, ExperimentDomain, Severity, Step, Warning};

fn component(kind: &str, props: &[(&str, &str)], position: &str, connections: &[&str]) -> Component {
    Component {
        component_type: kind.to_string(),
        properties: props
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect::<BTreeMap<_, _>>(),
        position: position.to_string(),
        connections: connections.iter().map(|c| c.to_string()).collect(),
    }
}

fn warning(severity: Severity, message: &str, recommendation: &str) -> Warning {
    Warning {
        severity,
        message: message.to_string(),
        recommendation: recommendation.to_string(),
    }
}

// Numbered 1..N in order.
fn steps(instructions: &[&str]) -> Vec<Step> {
    instructions
        .iter()
        .enumerate()
        .map(|(idx, text)| Step {
            step: idx as u32 + 1,
            instruction: text.to_string(),
        })
        .collect()
}

fn circuits() -> AnalysisResult {
    AnalysisResult {
        observations: "I can see a basic electrical circuit with a battery, LED, and wires. The LED appears to be connected directly to the battery without a current-limiting resistor.".to_string(),
        components: vec![
            component(
                "LED",
                &[("color", "red"), ("voltage", "2V")],
                "center of breadboard",
                &["9V battery positive"],
            ),
            component(
                "9V Battery",
                &[("voltage", "9V")],
                "left side",
                &["LED", "ground wire"],
            ),
        ],
        predicted_outcome: "The LED will initially light up very brightly but will likely burn out within seconds due to excessive current. A 9V battery connected directly to an LED designed for 2-3V will cause permanent damage.".to_string(),
        safety_warnings: vec![
            warning(
                Severity::High,
                "LED connected without current-limiting resistor",
                "Add a 470Ω to 1kΩ resistor in series with the LED to limit current to safe levels (10-20mA).",
            ),
            warning(
                Severity::Medium,
                "Voltage mismatch detected",
                "Use a lower voltage battery (3V) or add voltage regulation.",
            ),
        ],
        guidance: steps(&[
            "Disconnect the LED from the battery immediately",
            "Calculate required resistor: R = (V_battery - V_led) / I_desired = (9V - 2V) / 0.02A = 350Ω",
            "Use a 470Ω resistor (standard value) in series with the LED",
            "Connect resistor to LED anode (longer leg)",
            "Connect LED cathode (shorter leg) to battery negative",
            "Connect resistor other end to battery positive",
            "Verify LED lights up at safe brightness level",
        ]),
        confidence_score: 0.85,
    }
}

fn chemistry() -> AnalysisResult {
    AnalysisResult {
        observations: "I can see laboratory glassware including beakers and what appears to be chemicals. Safety equipment is present.".to_string(),
        components: vec![
            component("Beaker", &[("volume", "250ml")], "center of workspace", &[]),
            component("Chemical reagents", &[], "right side", &[]),
        ],
        predicted_outcome: "When these chemicals are mixed, a reaction will occur. The exact outcome depends on the specific chemicals being used.".to_string(),
        safety_warnings: vec![
            warning(
                Severity::High,
                "Always wear safety goggles and gloves when handling chemicals",
                "Put on appropriate personal protective equipment before proceeding.",
            ),
            warning(
                Severity::Medium,
                "Ensure proper ventilation",
                "Conduct experiment in a well-ventilated area or fume hood.",
            ),
        ],
        guidance: steps(&[
            "Put on safety goggles and lab gloves",
            "Verify all chemicals are properly labeled",
            "Add chemicals slowly while stirring",
            "Monitor for any unexpected reactions or heat generation",
            "Dispose of chemicals properly according to lab protocols",
        ]),
        confidence_score: 0.75,
    }
}

fn physics() -> AnalysisResult {
    AnalysisResult {
        observations: "I can see a mechanical setup with what appears to be a ramp and objects for motion experiments.".to_string(),
        components: vec![
            component("Inclined plane", &[("angle", "30 degrees")], "center", &[]),
            component("Rolling object", &[("shape", "sphere")], "top of ramp", &[]),
        ],
        predicted_outcome: "The object will roll down the inclined plane, accelerating due to gravity. The final velocity will depend on the height and friction coefficient.".to_string(),
        safety_warnings: vec![warning(
            Severity::Low,
            "Ensure the ramp is stable and won't tip over",
            "Secure the base of the ramp to prevent movement during the experiment.",
        )],
        guidance: steps(&[
            "Measure and record the ramp angle",
            "Mark starting and ending positions",
            "Release the object gently from the starting position",
            "Time the descent with a stopwatch",
            "Calculate velocity and acceleration from your measurements",
        ]),
        confidence_score: 0.80,
    }
}

/// Canned result for `domain`. Never fails.
pub fn generate(domain: ExperimentDomain) -> AnalysisResult {
    match domain {
        ExperimentDomain::Chemistry => chemistry(),
        ExperimentDomain::Physics => physics(),
        ExperimentDomain::Circuits | ExperimentDomain::General => circuits(),
    }
}
