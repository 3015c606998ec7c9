use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A clinical encounter as handed over by the scheduling/charting
/// collaborator. Read-only input to the billing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encounter {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub provider_npi: Option<String>,
    pub payer_id: String,
    pub service_date: NaiveDate,
    /// CMS place-of-service code (11 office, 02 telehealth, ...).
    pub place_of_service: u8,
    /// Raw scheduling type: surgery, procedure, lab, radiology,
    /// office_visit, telehealth, consultation, emergency, ...
    pub encounter_class: String,
    /// Pre-coded CPT, if the charting side already assigned one.
    pub cpt_code: Option<String>,
    pub procedure_description: Option<String>,
    /// Documented ICD-10 codes in charting order; first is principal.
    pub diagnosis_codes: Vec<String>,
    pub new_patient: bool,
    pub prior_auth_number: Option<String>,
    pub documentation: Documentation,
    pub flags: EncounterFlags,
}

/// Documentation elements relevant to E/M leveling and modifier logic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Documentation {
    pub history_documented: bool,
    pub exam_documented: bool,
    /// Distinct problems addressed this visit.
    pub problem_count: u8,
    pub data_review: Option<super::enums::DataReview>,
    pub risk: Option<super::enums::RiskLevel>,
    pub total_minutes: Option<u32>,
    pub counseling_minutes: Option<u32>,
    /// Free-text visit note, scanned for modifier circumstance keywords.
    pub note: String,
}

impl Documentation {
    /// Time-based E/M leveling applies only when counseling and
    /// coordination dominate the visit (> 50% of total time).
    pub fn counseling_dominated(&self) -> bool {
        match (self.total_minutes, self.counseling_minutes) {
            (Some(total), Some(counseling)) if total > 0 => counseling * 2 > total,
            _ => false,
        }
    }

    pub fn has_mdm_elements(&self) -> bool {
        self.problem_count > 0 && self.data_review.is_some() && self.risk.is_some()
    }
}

/// Billing-relevant circumstance flags set by the charting collaborator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EncounterFlags {
    pub telehealth: bool,
    pub bilateral: bool,
    pub distinct_service: bool,
    pub repeat_same_provider: bool,
    pub repeat_other_provider: bool,
    pub repeat_lab: bool,
    /// Separately identifiable E/M on the same day as a procedure.
    pub separate_em: bool,
}
