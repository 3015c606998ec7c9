use serde::{Deserialize, Serialize};

use super::enums::{CodeCategory, CodeSource, CodeSystem};
use super::fee::ModifierSet;

/// A code proposed for an encounter by one source. Several sources may
/// propose for the same category; the reconciler picks one winner per
/// category by fixed source priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateCode {
    pub system: CodeSystem,
    pub code: String,
    pub description: String,
    /// 0-100.
    pub confidence: u8,
    pub source: CodeSource,
    pub category: CodeCategory,
    pub rationale: String,
    /// Only meaningful for procedure candidates.
    #[serde(default)]
    pub modifiers: ModifierSet,
    #[serde(default = "default_units")]
    pub units: u32,
}

fn default_units() -> u32 {
    1
}

impl CandidateCode {
    pub fn is_diagnosis(&self) -> bool {
        matches!(
            self.category,
            CodeCategory::PrincipalDiagnosis | CodeCategory::SecondaryDiagnosis
        )
    }
}

/// A diagnosis in its claim position. Position 1 is always principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisCode {
    pub code: String,
    pub description: String,
}

/// A billable procedure with its modifier set, ready for fee lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureCode {
    pub system: CodeSystem,
    pub code: String,
    pub description: String,
    pub modifiers: ModifierSet,
    pub units: u32,
}

impl ProcedureCode {
    /// Dedup key: a code with modifier 25 is distinct from the bare code.
    pub fn identity(&self) -> String {
        format!("{}:{}:{}", self.system, self.code, self.modifiers.key())
    }
}

/// The per-encounter output of reconciliation: one principal diagnosis,
/// ordered secondaries, ordered procedures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciledCodeSet {
    pub principal: DiagnosisCode,
    pub secondaries: Vec<DiagnosisCode>,
    pub procedures: Vec<ProcedureCode>,
}

impl ReconciledCodeSet {
    /// The ordered claim-level diagnosis list. Index 0 = position 1 =
    /// principal; the wire format points into this list, not at codes.
    pub fn diagnoses(&self) -> Vec<DiagnosisCode> {
        let mut out = Vec::with_capacity(1 + self.secondaries.len());
        out.push(self.principal.clone());
        out.extend(self.secondaries.iter().cloned());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc_with_mods(code: &str, mods: &[&str]) -> ProcedureCode {
        ProcedureCode {
            system: CodeSystem::Cpt,
            code: code.into(),
            description: String::new(),
            modifiers: ModifierSet::new(mods.iter().map(|m| m.to_string()).collect()),
            units: 1,
        }
    }

    #[test]
    fn identity_distinguishes_modifier_sets() {
        let bare = proc_with_mods("99213", &[]);
        let with_25 = proc_with_mods("99213", &["25"]);
        assert_ne!(bare.identity(), with_25.identity());
    }

    #[test]
    fn identity_ignores_modifier_order() {
        let a = proc_with_mods("12001", &["59", "25"]);
        let b = proc_with_mods("12001", &["25", "59"]);
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn diagnoses_puts_principal_first() {
        let set = ReconciledCodeSet {
            principal: DiagnosisCode {
                code: "I10".into(),
                description: "Essential hypertension".into(),
            },
            secondaries: vec![DiagnosisCode {
                code: "Z59.0".into(),
                description: "Homelessness".into(),
            }],
            procedures: vec![],
        };
        let list = set.diagnoses();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].code, "I10");
        assert_eq!(list[1].code, "Z59.0");
    }
}
