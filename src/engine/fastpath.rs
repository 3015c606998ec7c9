//! Pre-approved common scenarios.
//!
//! A small table of routine encounters with known-good default code
//! sets. A match above the auto-approve threshold skips the lookup and
//! leveling nodes entirely; the output is structurally identical to the
//! full pipeline, only cheaper to produce.

use crate::models::enums::CodeSystem;
use crate::models::Encounter;

#[derive(Debug)]
pub struct Scenario {
    pub name: &'static str,
    pub encounter_class: &'static str,
    pub new_patient: bool,
    pub procedure_system: CodeSystem,
    pub procedure_code: &'static str,
    pub modifiers: &'static [&'static str],
    /// Billed only when the chart documented no diagnosis at all.
    pub default_diagnosis: (&'static str, &'static str),
    pub confidence: u8,
}

const GENERAL_EXAM: (&str, &str) = (
    "Z00.00",
    "Encounter for general adult medical examination without abnormal findings",
);

pub const SCENARIOS: [Scenario; 4] = [
    Scenario {
        name: "routine office visit",
        encounter_class: "office_visit",
        new_patient: false,
        procedure_system: CodeSystem::Cpt,
        procedure_code: "99213",
        modifiers: &[],
        default_diagnosis: GENERAL_EXAM,
        confidence: 92,
    },
    Scenario {
        name: "telehealth follow-up",
        encounter_class: "telehealth",
        new_patient: false,
        procedure_system: CodeSystem::Cpt,
        procedure_code: "99213",
        modifiers: &["95"],
        default_diagnosis: GENERAL_EXAM,
        confidence: 91,
    },
    Scenario {
        name: "annual wellness visit",
        encounter_class: "annual_wellness",
        new_patient: false,
        procedure_system: CodeSystem::Hcpcs,
        procedure_code: "G0439",
        modifiers: &[],
        default_diagnosis: GENERAL_EXAM,
        confidence: 93,
    },
    // Below the auto-approve threshold on purpose: new patients get the
    // full leveling pass.
    Scenario {
        name: "new patient office visit",
        encounter_class: "office_visit",
        new_patient: true,
        procedure_system: CodeSystem::Cpt,
        procedure_code: "99203",
        modifiers: &[],
        default_diagnosis: GENERAL_EXAM,
        confidence: 85,
    },
];

/// A scenario only matches a plain rendition of itself: a supplied CPT
/// or any special-circumstance flag means the encounter is not routine.
pub fn match_scenario(encounter: &Encounter) -> Option<&'static Scenario> {
    if encounter.cpt_code.is_some() || !is_routine(encounter) {
        return None;
    }
    SCENARIOS.iter().find(|s| {
        s.encounter_class.eq_ignore_ascii_case(&encounter.encounter_class)
            && s.new_patient == encounter.new_patient
    })
}

fn is_routine(encounter: &Encounter) -> bool {
    let f = &encounter.flags;
    !(f.bilateral
        || f.distinct_service
        || f.repeat_same_provider
        || f.repeat_other_provider
        || f.repeat_lab
        || f.separate_em)
}
