//! Code reconciliation: merges candidate codes from the decision engine
//! and external suggestion collaborators into one authoritative set.
//!
//! Priority is fixed: DecisionEngine > Ai > Sdoh > Default. Within a
//! category the highest-priority source that populated it owns it;
//! secondary diagnoses are the exception: distinct codes from lower
//! tiers (SDOH Z-codes) are additive rather than displaced.

use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::models::enums::{CodeCategory, CodeSource};
use crate::models::{CandidateCode, DiagnosisCode, Encounter, ProcedureCode, ReconciledCodeSet};

#[derive(Error, Debug)]
pub enum SuggestionError {
    #[error("Suggestion source timed out")]
    Timeout,

    #[error("Suggestion source unavailable: {0}")]
    Unavailable(String),
}

/// An external supplier of candidate codes (AI coder, SDOH assessment).
/// One per collaborator, queried per encounter.
pub trait CandidateSource {
    fn name(&self) -> &'static str;
    fn collect(&self, encounter: &Encounter) -> Result<Vec<CandidateCode>, SuggestionError>;
}

/// Bounds a slow collaborator with a hard deadline; a timeout yields an
/// empty candidate list rather than stalling claim generation.
pub struct TimeoutCandidateSource<S> {
    inner: Arc<S>,
    timeout: Duration,
}

impl<S> TimeoutCandidateSource<S>
where
    S: CandidateSource + Send + Sync + 'static,
{
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner: Arc::new(inner), timeout }
    }
}

impl<S> CandidateSource for TimeoutCandidateSource<S>
where
    S: CandidateSource + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn collect(&self, encounter: &Encounter) -> Result<Vec<CandidateCode>, SuggestionError> {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let encounter = encounter.clone();
        thread::spawn(move || {
            let _ = tx.send(inner.collect(&encounter));
        });
        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(_) => Err(SuggestionError::Timeout),
        }
    }
}

/// Merge configuration. The conservative default principal is billed
/// when no source produced any diagnosis at all.
#[derive(Debug, Clone)]
pub struct Reconciler {
    pub default_principal: DiagnosisCode,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self {
            default_principal: DiagnosisCode {
                code: "Z00.00".into(),
                description: "Encounter for general adult medical examination without abnormal findings"
                    .into(),
            },
        }
    }
}

impl Reconciler {
    /// Merge all candidates (engine + collaborators, any order) into one
    /// ReconciledCodeSet.
    pub fn reconcile(&self, candidates: Vec<CandidateCode>) -> ReconciledCodeSet {
        let mut principals = Vec::new();
        let mut secondaries = Vec::new();
        let mut procedures = Vec::new();
        for c in candidates {
            match c.category {
                CodeCategory::PrincipalDiagnosis => principals.push(c),
                CodeCategory::SecondaryDiagnosis => secondaries.push(c),
                CodeCategory::Procedure => procedures.push(c),
            }
        }

        let principal = self.pick_principal(&mut principals, &mut secondaries);
        let secondaries = merge_secondaries(secondaries, &principal);
        let procedures = owned_procedures(procedures);

        ReconciledCodeSet { principal, secondaries, procedures }
    }

    /// Winner by (priority, confidence); if the category is empty,
    /// promote the engine's best-confidence diagnosis, else fall back to
    /// the conservative default.
    fn pick_principal(
        &self,
        principals: &mut Vec<CandidateCode>,
        secondaries: &mut Vec<CandidateCode>,
    ) -> DiagnosisCode {
        principals.sort_by(|a, b| {
            (b.source.priority(), b.confidence).cmp(&(a.source.priority(), a.confidence))
        });
        if let Some(winner) = principals.first() {
            for dropped in &principals[1..] {
                tracing::debug!(
                    code = %dropped.code,
                    source = dropped.source.as_str(),
                    "principal diagnosis displaced by higher-priority source"
                );
            }
            return DiagnosisCode {
                code: winner.code.clone(),
                description: winner.description.clone(),
            };
        }

        let best_engine = secondaries
            .iter()
            .enumerate()
            .filter(|(_, c)| c.source == CodeSource::DecisionEngine)
            .max_by_key(|(_, c)| c.confidence)
            .map(|(i, _)| i);
        if let Some(i) = best_engine {
            let promoted = secondaries.remove(i);
            tracing::info!(code = %promoted.code, "promoted engine diagnosis to principal");
            return DiagnosisCode { code: promoted.code, description: promoted.description };
        }

        tracing::warn!(
            code = %self.default_principal.code,
            "no diagnosis from any source, using conservative default"
        );
        self.default_principal.clone()
    }
}

/// Secondary diagnoses are additive across sources: iterate in priority
/// order, keep first occurrence of each code, never duplicate the
/// principal.
fn merge_secondaries(mut candidates: Vec<CandidateCode>, principal: &DiagnosisCode) -> Vec<DiagnosisCode> {
    candidates.sort_by(|a, b| {
        (b.source.priority(), b.confidence).cmp(&(a.source.priority(), a.confidence))
    });
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(principal.code.clone());
    let mut out = Vec::new();
    for c in candidates {
        if seen.insert(c.code.clone()) {
            out.push(DiagnosisCode { code: c.code, description: c.description });
        }
    }
    out
}

/// Procedures are owned by the highest-priority source that populated
/// the category; a lower tier's conflicting codes are dropped whole.
fn owned_procedures(candidates: Vec<CandidateCode>) -> Vec<ProcedureCode> {
    let owner = match candidates.iter().map(|c| c.source.priority()).max() {
        Some(p) => p,
        None => return Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for c in candidates {
        if c.source.priority() < owner {
            tracing::debug!(
                code = %c.code,
                source = c.source.as_str(),
                "procedure candidate displaced by higher-priority source"
            );
            continue;
        }
        let procedure = ProcedureCode {
            system: c.system,
            code: c.code,
            description: c.description,
            modifiers: c.modifiers,
            units: c.units,
        };
        if seen.insert(procedure.identity()) {
            out.push(procedure);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::CodeSystem;
    use crate::models::ModifierSet;

    fn candidate(
        system: CodeSystem,
        code: &str,
        confidence: u8,
        source: CodeSource,
        category: CodeCategory,
    ) -> CandidateCode {
        CandidateCode {
            system,
            code: code.into(),
            description: format!("{code} description"),
            confidence,
            source,
            category,
            rationale: String::new(),
            modifiers: ModifierSet::empty(),
            units: 1,
        }
    }

    #[test]
    fn engine_beats_conflicting_ai_procedure() {
        let set = Reconciler::default().reconcile(vec![
            candidate(CodeSystem::Cpt, "99213", 85, CodeSource::DecisionEngine, CodeCategory::Procedure),
            candidate(CodeSystem::Cpt, "99214", 95, CodeSource::Ai, CodeCategory::Procedure),
            candidate(CodeSystem::Icd10, "I10", 90, CodeSource::DecisionEngine, CodeCategory::PrincipalDiagnosis),
        ]);
        assert_eq!(set.procedures.len(), 1);
        assert_eq!(set.procedures[0].code, "99213");
    }

    #[test]
    fn engine_principal_beats_ai_principal() {
        let set = Reconciler::default().reconcile(vec![
            candidate(CodeSystem::Icd10, "E11.9", 99, CodeSource::Ai, CodeCategory::PrincipalDiagnosis),
            candidate(CodeSystem::Icd10, "I10", 70, CodeSource::DecisionEngine, CodeCategory::PrincipalDiagnosis),
        ]);
        assert_eq!(set.principal.code, "I10");
    }

    #[test]
    fn sdoh_z_codes_are_additive_secondaries() {
        let set = Reconciler::default().reconcile(vec![
            candidate(CodeSystem::Icd10, "I10", 90, CodeSource::DecisionEngine, CodeCategory::PrincipalDiagnosis),
            candidate(CodeSystem::Icd10, "E11.9", 80, CodeSource::DecisionEngine, CodeCategory::SecondaryDiagnosis),
            candidate(CodeSystem::Icd10, "Z59.0", 75, CodeSource::Sdoh, CodeCategory::SecondaryDiagnosis),
            candidate(CodeSystem::Icd10, "Z59.41", 70, CodeSource::Sdoh, CodeCategory::SecondaryDiagnosis),
        ]);
        let codes: Vec<&str> = set.secondaries.iter().map(|d| d.code.as_str()).collect();
        assert_eq!(codes, vec!["E11.9", "Z59.0", "Z59.41"]);
    }

    #[test]
    fn duplicate_codes_across_sources_deduped() {
        let set = Reconciler::default().reconcile(vec![
            candidate(CodeSystem::Icd10, "I10", 90, CodeSource::DecisionEngine, CodeCategory::PrincipalDiagnosis),
            candidate(CodeSystem::Icd10, "Z59.0", 80, CodeSource::Ai, CodeCategory::SecondaryDiagnosis),
            candidate(CodeSystem::Icd10, "Z59.0", 75, CodeSource::Sdoh, CodeCategory::SecondaryDiagnosis),
        ]);
        assert_eq!(set.secondaries.len(), 1);
    }

    #[test]
    fn secondary_equal_to_principal_dropped() {
        let set = Reconciler::default().reconcile(vec![
            candidate(CodeSystem::Icd10, "I10", 90, CodeSource::DecisionEngine, CodeCategory::PrincipalDiagnosis),
            candidate(CodeSystem::Icd10, "I10", 60, CodeSource::Sdoh, CodeCategory::SecondaryDiagnosis),
        ]);
        assert!(set.secondaries.is_empty());
    }

    #[test]
    fn missing_principal_promotes_best_engine_diagnosis() {
        let set = Reconciler::default().reconcile(vec![
            candidate(CodeSystem::Icd10, "E11.9", 65, CodeSource::DecisionEngine, CodeCategory::SecondaryDiagnosis),
            candidate(CodeSystem::Icd10, "I10", 85, CodeSource::DecisionEngine, CodeCategory::SecondaryDiagnosis),
            candidate(CodeSystem::Icd10, "Z59.0", 99, CodeSource::Sdoh, CodeCategory::SecondaryDiagnosis),
        ]);
        assert_eq!(set.principal.code, "I10");
        let codes: Vec<&str> = set.secondaries.iter().map(|d| d.code.as_str()).collect();
        assert_eq!(codes, vec!["E11.9", "Z59.0"]);
    }

    #[test]
    fn no_candidates_falls_back_to_default_principal() {
        let set = Reconciler::default().reconcile(vec![]);
        assert_eq!(set.principal.code, "Z00.00");
        assert!(set.secondaries.is_empty());
        assert!(set.procedures.is_empty());
    }

    #[test]
    fn same_code_different_modifiers_both_kept() {
        let mut with_25 = candidate(
            CodeSystem::Cpt,
            "99213",
            90,
            CodeSource::DecisionEngine,
            CodeCategory::Procedure,
        );
        with_25.modifiers = ModifierSet::new(vec!["25".into()]);
        let bare = candidate(
            CodeSystem::Cpt,
            "99213",
            90,
            CodeSource::DecisionEngine,
            CodeCategory::Procedure,
        );
        let set = Reconciler::default().reconcile(vec![
            candidate(CodeSystem::Icd10, "I10", 90, CodeSource::DecisionEngine, CodeCategory::PrincipalDiagnosis),
            with_25,
            bare,
        ]);
        assert_eq!(set.procedures.len(), 2);
    }

    struct SlowSource;

    impl CandidateSource for SlowSource {
        fn name(&self) -> &'static str {
            "slow-ai"
        }

        fn collect(&self, _encounter: &Encounter) -> Result<Vec<CandidateCode>, SuggestionError> {
            thread::sleep(Duration::from_secs(5));
            Ok(vec![])
        }
    }

    #[test]
    fn timeout_source_reports_timeout() {
        use crate::models::{Documentation, EncounterFlags};
        use chrono::NaiveDate;
        use uuid::Uuid;

        let encounter = Encounter {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            provider_npi: None,
            payer_id: "AETNA".into(),
            service_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            place_of_service: 11,
            encounter_class: "office_visit".into(),
            cpt_code: None,
            procedure_description: None,
            diagnosis_codes: vec![],
            new_patient: false,
            prior_auth_number: None,
            documentation: Documentation::default(),
            flags: EncounterFlags::default(),
        };
        let source = TimeoutCandidateSource::new(SlowSource, Duration::from_millis(50));
        let result = source.collect(&encounter);
        assert!(matches!(result, Err(SuggestionError::Timeout)));
    }
}
