//! Pipeline node E: billing modifier derivation.
//!
//! A fixed circumstance table evaluated against encounter flags and
//! documentation keywords. Each true circumstance maps to its modifier
//! plus a rationale string keyed by modifier, so reviewers see why a
//! modifier landed on the claim.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::models::enums::ServiceClass;
use crate::models::Encounter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedModifier {
    pub code: &'static str,
    pub rationale: &'static str,
}

/// Telehealth place-of-service codes (02 telehealth, 10 patient home).
const TELEHEALTH_POS: [u8; 2] = [2, 10];

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap_or_else(|e| panic!("bad pattern: {e}")))
}

fn note_has_separate_em(note: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)separately identifiable").is_match(note)
}

fn note_has_bilateral(note: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)\bbilateral(ly)?\b").is_match(note)
}

fn note_has_distinct(note: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)distinct procedural service|separate procedure").is_match(note)
}

fn note_has_repeat_same(note: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)repeat(ed)? procedure.*same (physician|provider)").is_match(note)
}

fn note_has_repeat_other(note: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)repeat(ed)? procedure.*(different|another) (physician|provider)").is_match(note)
}

fn note_has_repeat_lab(note: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)repeat(ed)? (lab|laboratory|test)").is_match(note)
}

/// The X{E,S,P,U} family refines 59 when the note names which kind of
/// distinct service was performed.
fn distinct_subset(note: &str) -> &'static str {
    static XE: OnceLock<Regex> = OnceLock::new();
    static XS: OnceLock<Regex> = OnceLock::new();
    static XP: OnceLock<Regex> = OnceLock::new();
    static XU: OnceLock<Regex> = OnceLock::new();
    if regex(&XE, r"(?i)separate encounter").is_match(note) {
        "XE"
    } else if regex(&XS, r"(?i)separate (structure|site|organ)").is_match(note) {
        "XS"
    } else if regex(&XP, r"(?i)separate practitioner").is_match(note) {
        "XP"
    } else if regex(&XU, r"(?i)(unusual|non-overlapping|reduced) service").is_match(note) {
        "XU"
    } else {
        "59"
    }
}

pub fn rationale_for(code: &str) -> &'static str {
    match code {
        "25" => "Significant, separately identifiable E/M service on the same day as a procedure",
        "50" => "Procedure performed bilaterally",
        "59" => "Distinct procedural service from other services on the same day",
        "76" => "Repeat procedure by the same provider",
        "77" => "Repeat procedure by a different provider",
        "91" => "Repeat clinical diagnostic laboratory test",
        "95" => "Service rendered via synchronous telemedicine",
        "XE" => "Distinct service: separate encounter",
        "XS" => "Distinct service: separate structure",
        "XP" => "Distinct service: separate practitioner",
        "XU" => "Distinct service: unusual non-overlapping service",
        _ => "Circumstance documented in the encounter note",
    }
}

fn applied(code: &'static str) -> AppliedModifier {
    AppliedModifier { code, rationale: rationale_for(code) }
}

pub fn evaluate(encounter: &Encounter, class: ServiceClass) -> Vec<AppliedModifier> {
    let note = encounter.documentation.note.as_str();
    let flags = &encounter.flags;
    let mut out = Vec::new();

    if flags.separate_em || note_has_separate_em(note) {
        out.push(applied("25"));
    }

    if class == ServiceClass::Procedural && (flags.bilateral || note_has_bilateral(note)) {
        out.push(applied("50"));
    }

    if flags.distinct_service || note_has_distinct(note) {
        match distinct_subset(note) {
            "XE" => out.push(applied("XE")),
            "XS" => out.push(applied("XS")),
            "XP" => out.push(applied("XP")),
            "XU" => out.push(applied("XU")),
            _ => out.push(applied("59")),
        }
    }

    if flags.repeat_same_provider || note_has_repeat_same(note) {
        out.push(applied("76"));
    }

    if flags.repeat_other_provider || note_has_repeat_other(note) {
        out.push(applied("77"));
    }

    if flags.repeat_lab || note_has_repeat_lab(note) {
        out.push(applied("91"));
    }

    let telehealth = flags.telehealth
        || encounter.encounter_class.eq_ignore_ascii_case("telehealth")
        || TELEHEALTH_POS.contains(&encounter.place_of_service);
    if telehealth {
        out.push(applied("95"));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Documentation, EncounterFlags};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn encounter(class: &str, pos: u8, note: &str, flags: EncounterFlags) -> Encounter {
        Encounter {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            provider_npi: None,
            payer_id: "AETNA".into(),
            service_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            place_of_service: pos,
            encounter_class: class.into(),
            cpt_code: None,
            procedure_description: None,
            diagnosis_codes: vec![],
            new_patient: false,
            prior_auth_number: None,
            documentation: Documentation { note: note.into(), ..Default::default() },
            flags,
        }
    }

    fn codes(mods: &[AppliedModifier]) -> Vec<&'static str> {
        mods.iter().map(|m| m.code).collect()
    }

    #[test]
    fn no_circumstances_no_modifiers() {
        let e = encounter("office_visit", 11, "routine follow-up", EncounterFlags::default());
        assert!(evaluate(&e, ServiceClass::EvaluationManagement).is_empty());
    }

    #[test]
    fn bilateral_flag_maps_to_50_procedural_only() {
        let flags = EncounterFlags { bilateral: true, ..Default::default() };
        let e = encounter("procedure", 11, "", flags);
        assert_eq!(codes(&evaluate(&e, ServiceClass::Procedural)), vec!["50"]);
        assert!(evaluate(&e, ServiceClass::EvaluationManagement).is_empty());
    }

    #[test]
    fn bilateral_keyword_detected_in_note() {
        let e = encounter("procedure", 11, "lesions destroyed bilaterally", EncounterFlags::default());
        assert_eq!(codes(&evaluate(&e, ServiceClass::Procedural)), vec!["50"]);
    }

    #[test]
    fn telehealth_class_maps_to_95() {
        let e = encounter("telehealth", 11, "", EncounterFlags::default());
        assert_eq!(codes(&evaluate(&e, ServiceClass::EvaluationManagement)), vec!["95"]);
    }

    #[test]
    fn telehealth_place_of_service_maps_to_95() {
        let e = encounter("office_visit", 2, "", EncounterFlags::default());
        assert_eq!(codes(&evaluate(&e, ServiceClass::EvaluationManagement)), vec!["95"]);
    }

    #[test]
    fn separate_em_maps_to_25() {
        let e = encounter(
            "office_visit",
            11,
            "Separately identifiable E/M performed in addition to the biopsy",
            EncounterFlags::default(),
        );
        assert_eq!(codes(&evaluate(&e, ServiceClass::EvaluationManagement)), vec!["25"]);
    }

    #[test]
    fn distinct_service_defaults_to_59() {
        let flags = EncounterFlags { distinct_service: true, ..Default::default() };
        let e = encounter("procedure", 11, "", flags);
        assert_eq!(codes(&evaluate(&e, ServiceClass::Procedural)), vec!["59"]);
    }

    #[test]
    fn distinct_service_refines_to_x_family() {
        let flags = EncounterFlags { distinct_service: true, ..Default::default() };
        for (note, expected) in [
            ("performed at a separate encounter later that day", "XE"),
            ("injection into a separate structure", "XS"),
            ("administered by a separate practitioner", "XP"),
            ("unusual service not overlapping the panel", "XU"),
        ] {
            let e = encounter("procedure", 11, note, flags);
            assert_eq!(codes(&evaluate(&e, ServiceClass::Procedural)), vec![expected], "{note}");
        }
    }

    #[test]
    fn repeat_circumstances_map_to_76_77_91() {
        let e = encounter(
            "procedure",
            11,
            "Repeat procedure performed by the same physician after dehiscence",
            EncounterFlags::default(),
        );
        assert_eq!(codes(&evaluate(&e, ServiceClass::Procedural)), vec!["76"]);

        let flags = EncounterFlags { repeat_other_provider: true, ..Default::default() };
        let e = encounter("procedure", 11, "", flags);
        assert_eq!(codes(&evaluate(&e, ServiceClass::Procedural)), vec!["77"]);

        let flags = EncounterFlags { repeat_lab: true, ..Default::default() };
        let e = encounter("lab", 11, "", flags);
        assert_eq!(codes(&evaluate(&e, ServiceClass::Procedural)), vec!["91"]);
    }

    #[test]
    fn multiple_circumstances_stack() {
        let flags = EncounterFlags { separate_em: true, telehealth: true, ..Default::default() };
        let e = encounter("telehealth", 2, "", flags);
        assert_eq!(codes(&evaluate(&e, ServiceClass::EvaluationManagement)), vec!["25", "95"]);
    }

    #[test]
    fn every_modifier_has_a_rationale() {
        for code in ["25", "50", "59", "76", "77", "91", "95", "XE", "XS", "XP", "XU"] {
            assert!(!rationale_for(code).is_empty());
        }
    }
}
