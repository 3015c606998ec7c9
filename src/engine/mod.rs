//! The billing decision engine: a fixed pipeline of six nodes that
//! derives billable codes and modifiers from an encounter.
//!
//! Eligibility (A) and classification (B) always run. A pre-approved
//! scenario match above the auto-approve threshold short-circuits CPT
//! lookup (C), E/M leveling (D), and modifier derivation (E); fee
//! lookup (F) runs at claim assembly either way. Terminal states:
//! `Completed`, `ManualReviewRequired`, `Denied`. Low confidence never
//! blocks claim generation, it only flags the claim for human review.

pub mod classify;
pub mod eligibility;
pub mod em_level;
pub mod fastpath;
pub mod modifiers;
pub mod procedure;

use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;

use crate::db::{self, DatabaseError};
use crate::models::enums::{CodeCategory, CodeSource, CodeSystem, DenialReason, ServiceClass};
use crate::models::{CandidateCode, Encounter, ModifierSet, Patient};

use classify::Classification;
use eligibility::EligibilityOutcome;
use em_level::EmSelection;
use modifiers::AppliedModifier;
use procedure::ProcedureSelection;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Confidence thresholds. Per-payer variation is a different config
/// value, not a code change.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// A fast-path scenario at or above this skips nodes C-E. Default 90.
    pub auto_approve_threshold: u8,
    /// Any node below this flags the encounter for review. Default 70.
    pub manual_review_threshold: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { auto_approve_threshold: 90, manual_review_threshold: 70 }
    }
}

/// Terminal state of an engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Disposition {
    Completed,
    ManualReviewRequired,
    Denied(DenialReason),
}

/// Everything the engine derived for one encounter. Denials carry no
/// candidates; review flags carry best-effort candidates so billing is
/// never blocked on a human.
#[derive(Debug, Serialize)]
pub struct EngineResult {
    pub disposition: Disposition,
    pub classification: Classification,
    pub candidates: Vec<CandidateCode>,
    pub applied_modifiers: Vec<AppliedModifier>,
    pub em: Option<EmSelection>,
    pub procedure: Option<ProcedureSelection>,
    pub review_reasons: Vec<String>,
    /// Scenario name when the fast path was taken.
    pub fast_path: Option<&'static str>,
    /// Present unless the encounter was denied before the patient loaded.
    #[serde(skip)]
    pub patient: Option<Patient>,
}

pub struct DecisionEngine<'c> {
    conn: &'c Connection,
    config: EngineConfig,
}

impl<'c> DecisionEngine<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn, config: EngineConfig::default() }
    }

    pub fn with_config(conn: &'c Connection, config: EngineConfig) -> Self {
        Self { conn, config }
    }

    pub fn evaluate(&self, encounter: &Encounter) -> Result<EngineResult, EngineError> {
        // Node A: eligibility gate.
        let patient = match eligibility::check(self.conn, encounter)? {
            EligibilityOutcome::Eligible { patient, .. } => patient,
            EligibilityOutcome::Denied(reason) => {
                tracing::info!(encounter = %encounter.id, reason = reason.as_str(), "encounter denied");
                return Ok(EngineResult {
                    disposition: Disposition::Denied(reason),
                    classification: classify::classify(encounter),
                    candidates: vec![],
                    applied_modifiers: vec![],
                    em: None,
                    procedure: None,
                    review_reasons: vec![],
                    fast_path: None,
                    patient: None,
                });
            }
        };

        // Node B: classification.
        let classification = classify::classify(encounter);
        let mut review_reasons = Vec::new();
        if classification.confidence < self.config.manual_review_threshold {
            review_reasons.push(format!(
                "service classification uncertain ({} at confidence {})",
                classification.class, classification.confidence
            ));
        }

        let mut candidates = self.diagnosis_candidates(encounter, &mut review_reasons)?;

        // Fast path: a pre-approved scenario above the auto-approve
        // threshold replaces nodes C-E.
        if let Some(scenario) = fastpath::match_scenario(encounter) {
            if scenario.confidence >= self.config.auto_approve_threshold {
                tracing::info!(encounter = %encounter.id, scenario = scenario.name, "fast path taken");
                let applied: Vec<AppliedModifier> = scenario
                    .modifiers
                    .iter()
                    .map(|&m| AppliedModifier { code: m, rationale: modifiers::rationale_for(m) })
                    .collect();
                if candidates.iter().all(|c| !c.is_diagnosis()) {
                    candidates.push(scenario_default_diagnosis(scenario));
                }
                candidates.push(CandidateCode {
                    system: scenario.procedure_system,
                    code: scenario.procedure_code.into(),
                    description: format!("pre-approved scenario: {}", scenario.name),
                    confidence: scenario.confidence,
                    source: CodeSource::DecisionEngine,
                    category: CodeCategory::Procedure,
                    rationale: format!("pre-approved scenario: {}", scenario.name),
                    modifiers: ModifierSet::new(
                        scenario.modifiers.iter().map(|m| m.to_string()).collect(),
                    ),
                    units: 1,
                });
                return Ok(EngineResult {
                    disposition: disposition_from(&review_reasons),
                    classification,
                    candidates,
                    applied_modifiers: applied,
                    em: None,
                    procedure: None,
                    review_reasons,
                    fast_path: Some(scenario.name),
                    patient: Some(patient),
                });
            }
        }

        // Nodes C/D: code selection by class; node E: modifiers.
        let mut em = None;
        let mut procedure_selection = None;
        let applied = modifiers::evaluate(encounter, classification.class);
        let modifier_set =
            ModifierSet::new(applied.iter().map(|m| m.code.to_string()).collect());

        match classification.class {
            ServiceClass::Procedural => {
                let selection = procedure::select(self.conn, encounter)?;
                if selection.is_unlisted {
                    review_reasons.push(format!(
                        "unlisted procedure code {} requires documentation review",
                        selection.code
                    ));
                }
                if selection.confidence < self.config.manual_review_threshold {
                    review_reasons.push(format!(
                        "procedure match uncertain ({} at confidence {})",
                        selection.code, selection.confidence
                    ));
                }
                candidates.push(procedure_candidate(&selection, modifier_set));
                procedure_selection = Some(selection);
            }
            ServiceClass::EvaluationManagement | ServiceClass::Unknown => {
                // Unknown still levels as E/M so a best-effort claim can
                // be generated; the classification reason above already
                // routed it to review.
                let selection = em_level::determine(&encounter.documentation, encounter.new_patient);
                if selection.confidence < self.config.manual_review_threshold {
                    review_reasons.push(format!(
                        "documentation incomplete for E/M leveling (missing: {})",
                        selection.documentation.missing.join(", ")
                    ));
                }
                candidates.push(em_candidate(&selection, &classification, modifier_set));
                em = Some(selection);
            }
        }

        Ok(EngineResult {
            disposition: disposition_from(&review_reasons),
            classification,
            candidates,
            applied_modifiers: applied,
            em,
            procedure: procedure_selection,
            review_reasons,
            fast_path: None,
            patient: Some(patient),
        })
    }

    /// Documented ICD-10 codes become engine diagnosis candidates after
    /// validation against the reference table; the first documented code
    /// is the principal.
    fn diagnosis_candidates(
        &self,
        encounter: &Encounter,
        review_reasons: &mut Vec<String>,
    ) -> Result<Vec<CandidateCode>, EngineError> {
        let mut out = Vec::new();
        let mut principal_taken = false;
        for code in &encounter.diagnosis_codes {
            let entry = db::get_code(self.conn, CodeSystem::Icd10, code)?;
            let entry = match entry {
                Some(e) if e.is_active_on(encounter.service_date) => e,
                _ => {
                    review_reasons.push(format!("diagnosis code {code} not active in reference table"));
                    continue;
                }
            };
            let category = if principal_taken {
                CodeCategory::SecondaryDiagnosis
            } else {
                principal_taken = true;
                CodeCategory::PrincipalDiagnosis
            };
            out.push(CandidateCode {
                system: CodeSystem::Icd10,
                code: entry.code,
                description: entry.description,
                confidence: if category == CodeCategory::PrincipalDiagnosis { 90 } else { 85 },
                source: CodeSource::DecisionEngine,
                category,
                rationale: "documented in encounter chart".into(),
                modifiers: ModifierSet::empty(),
                units: 1,
            });
        }
        Ok(out)
    }
}

fn disposition_from(review_reasons: &[String]) -> Disposition {
    if review_reasons.is_empty() {
        Disposition::Completed
    } else {
        Disposition::ManualReviewRequired
    }
}

fn scenario_default_diagnosis(scenario: &fastpath::Scenario) -> CandidateCode {
    CandidateCode {
        system: CodeSystem::Icd10,
        code: scenario.default_diagnosis.0.into(),
        description: scenario.default_diagnosis.1.into(),
        confidence: 50,
        source: CodeSource::Default,
        category: CodeCategory::PrincipalDiagnosis,
        rationale: format!("scenario default diagnosis: {}", scenario.name),
        modifiers: ModifierSet::empty(),
        units: 1,
    }
}

fn procedure_candidate(selection: &ProcedureSelection, modifiers: ModifierSet) -> CandidateCode {
    let rationale = match selection.basis {
        procedure::MatchBasis::SuppliedCode => "validated supplied CPT against reference table",
        procedure::MatchBasis::DescriptionMatch => "matched procedure description to CPT long description",
        procedure::MatchBasis::NoMatch => "no reliable procedure match, best-effort code",
    };
    CandidateCode {
        system: CodeSystem::Cpt,
        code: selection.code.clone(),
        description: selection.description.clone(),
        confidence: selection.confidence,
        source: CodeSource::DecisionEngine,
        category: CodeCategory::Procedure,
        rationale: rationale.into(),
        modifiers,
        units: 1,
    }
}

fn em_candidate(
    selection: &EmSelection,
    classification: &Classification,
    modifiers: ModifierSet,
) -> CandidateCode {
    let method = match selection.method {
        em_level::LevelMethod::TimeBased => "time-based",
        em_level::LevelMethod::MdmBased => "MDM-based",
    };
    CandidateCode {
        system: CodeSystem::Cpt,
        code: selection.cpt_code.clone(),
        description: format!("E/M level {} ({method})", selection.level),
        confidence: selection.confidence.min(classification.confidence),
        source: CodeSource::DecisionEngine,
        category: CodeCategory::Procedure,
        rationale: format!("{method} E/M leveling selected level {}", selection.level),
        modifiers,
        units: 1,
    }
}
