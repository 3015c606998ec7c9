//! Pipeline node B: service classification.
//!
//! Deterministic rule ladder, first match wins. The rule name travels
//! with the result so audit can explain why an encounter was classed.

use serde::Serialize;

use crate::models::enums::ServiceClass;
use crate::models::Encounter;

const PROCEDURAL_CLASSES: [&str; 4] = ["surgery", "procedure", "lab", "radiology"];
const EM_CLASSES: [&str; 4] = ["office_visit", "telehealth", "consultation", "emergency"];

#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub class: ServiceClass,
    pub confidence: u8,
    pub rule: &'static str,
}

pub fn classify(encounter: &Encounter) -> Classification {
    let class = encounter.encounter_class.to_ascii_lowercase();

    if PROCEDURAL_CLASSES.contains(&class.as_str()) {
        return Classification {
            class: ServiceClass::Procedural,
            confidence: 95,
            rule: "procedural-encounter-type",
        };
    }

    if encounter.cpt_code.is_some() {
        return Classification {
            class: ServiceClass::Procedural,
            confidence: 90,
            rule: "pre-coded-procedure",
        };
    }

    if EM_CLASSES.contains(&class.as_str()) {
        return Classification {
            class: ServiceClass::EvaluationManagement,
            confidence: 95,
            rule: "em-encounter-type",
        };
    }

    Classification { class: ServiceClass::Unknown, confidence: 50, rule: "no-rule-matched" }
}
