//! Pipeline node D: E/M level determination.
//!
//! Two mutually exclusive methods. Time-based applies only when
//! counseling/coordination took more than half the visit; everything
//! else levels on medical decision making (problems + data + risk,
//! scaled to 40-100). Level and the patient-status flag select the CPT
//! from the new-patient or established-patient family.

use serde::Serialize;

use crate::models::enums::{DataReview, RiskLevel};
use crate::models::Documentation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LevelMethod {
    TimeBased,
    MdmBased,
}

/// Documentation completeness: which of the three E/M pillars are
/// present in the note.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentationScore {
    /// 0-100.
    pub score: u8,
    pub missing: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmSelection {
    /// 1-5.
    pub level: u8,
    pub method: LevelMethod,
    pub cpt_code: String,
    /// Populated for MDM-based leveling (40-100).
    pub mdm_score: Option<u8>,
    pub documentation: DocumentationScore,
    pub confidence: u8,
}

const NEW_PATIENT_CODES: [&str; 5] = ["99201", "99202", "99203", "99204", "99205"];
const ESTABLISHED_CODES: [&str; 5] = ["99211", "99212", "99213", "99214", "99215"];

pub fn determine(doc: &Documentation, new_patient: bool) -> EmSelection {
    let documentation = score_documentation(doc);
    let confidence = confidence_from(&documentation);

    if doc.counseling_dominated() {
        if let Some(minutes) = doc.total_minutes {
            let level = level_from_minutes(minutes);
            return EmSelection {
                level,
                method: LevelMethod::TimeBased,
                cpt_code: code_for_level(level, new_patient),
                mdm_score: None,
                documentation,
                confidence,
            };
        }
    }

    let score = mdm_score(doc);
    let level = level_from_mdm(score);
    EmSelection {
        level,
        method: LevelMethod::MdmBased,
        cpt_code: code_for_level(level, new_patient),
        mdm_score: Some(score),
        documentation,
        confidence,
    }
}

/// Total visit minutes to level: <20→1, 20-29→2, 30-39→3, 40-59→4, ≥60→5.
pub fn level_from_minutes(minutes: u32) -> u8 {
    match minutes {
        0..=19 => 1,
        20..=29 => 2,
        30..=39 => 3,
        40..=59 => 4,
        _ => 5,
    }
}

/// MDM raw points (3-11) scaled into 40-100.
///
/// Missing inputs score their floor: undocumented data review or risk
/// must never inflate the level.
pub fn mdm_score(doc: &Documentation) -> u8 {
    let problem_points = match doc.problem_count {
        0 | 1 => 1,
        2 => 2,
        _ => 3,
    };
    let data_points = doc.data_review.unwrap_or(DataReview::Minimal).points();
    let risk_points = doc.risk.unwrap_or(RiskLevel::Minimal).points();
    let sum = (problem_points + data_points + risk_points) as u32;
    (40 + (sum - 3) * 60 / 8) as u8
}

/// Scaled MDM score to level: 40-50→2, 51-75→3, 76-80→4, ≥81→5.
pub fn level_from_mdm(score: u8) -> u8 {
    match score {
        0..=50 => 2,
        51..=75 => 3,
        76..=80 => 4,
        _ => 5,
    }
}

pub fn code_for_level(level: u8, new_patient: bool) -> String {
    let index = (level.clamp(1, 5) - 1) as usize;
    let family = if new_patient { &NEW_PATIENT_CODES } else { &ESTABLISHED_CODES };
    family[index].to_string()
}

fn score_documentation(doc: &Documentation) -> DocumentationScore {
    let mut missing = Vec::new();
    if !doc.history_documented {
        missing.push("history");
    }
    if !doc.exam_documented {
        missing.push("examination");
    }
    if !doc.has_mdm_elements() {
        missing.push("medical decision making");
    }
    let present = (3 - missing.len()) as u16;
    DocumentationScore { score: (present * 100 / 3) as u8, missing }
}

fn confidence_from(documentation: &DocumentationScore) -> u8 {
    match documentation.missing.len() {
        0 => 95,
        1 => 75,
        2 => 60,
        _ => 50,
    }
}
