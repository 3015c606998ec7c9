use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(CodeSystem {
    Cpt => "cpt",
    Hcpcs => "hcpcs",
    Icd10 => "icd10",
});

str_enum!(CodeStatus {
    Active => "active",
    Retired => "retired",
});

str_enum!(CodeCategory {
    PrincipalDiagnosis => "principal_diagnosis",
    SecondaryDiagnosis => "secondary_diagnosis",
    Procedure => "procedure",
});

str_enum!(CodeSource {
    DecisionEngine => "decision_engine",
    Ai => "ai",
    Sdoh => "sdoh",
    Default => "default",
});

impl CodeSource {
    /// Reconciliation rank: higher wins within a category.
    pub fn priority(&self) -> u8 {
        match self {
            Self::DecisionEngine => 3,
            Self::Ai => 2,
            Self::Sdoh => 1,
            Self::Default => 0,
        }
    }
}

str_enum!(ServiceClass {
    Procedural => "procedural",
    EvaluationManagement => "evaluation_management",
    Unknown => "unknown",
});

str_enum!(ClaimStatus {
    Generated => "generated",
    Submitted => "submitted",
    Accepted => "accepted",
    Rejected => "rejected",
    Appealed => "appealed",
    Resubmitted => "resubmitted",
    Paid => "paid",
});

impl ClaimStatus {
    /// Lifecycle: generated → submitted → accepted|rejected →
    /// (rejected → appealed → resubmitted) → paid.
    pub fn can_transition_to(&self, next: ClaimStatus) -> bool {
        use ClaimStatus::*;
        matches!(
            (self, next),
            (Generated, Submitted)
                | (Submitted, Accepted)
                | (Submitted, Rejected)
                | (Resubmitted, Accepted)
                | (Resubmitted, Rejected)
                | (Rejected, Appealed)
                | (Appealed, Resubmitted)
                | (Accepted, Paid)
        )
    }
}

str_enum!(DenialReason {
    PatientNotFound => "patient-not-found",
    InactivePolicy => "inactive-policy",
    PayerMismatch => "payer-mismatch",
    AuthRequired => "auth-required",
});

str_enum!(RateSource {
    Contracted => "contracted",
    Chargemaster => "chargemaster",
    Reference => "reference",
    Default => "default",
});

str_enum!(DataReview {
    Minimal => "minimal",
    Limited => "limited",
    Moderate => "moderate",
    Extensive => "extensive",
});

impl DataReview {
    pub fn points(&self) -> u8 {
        match self {
            Self::Minimal => 1,
            Self::Limited => 2,
            Self::Moderate => 3,
            Self::Extensive => 4,
        }
    }
}

str_enum!(RiskLevel {
    Minimal => "minimal",
    Low => "low",
    Moderate => "moderate",
    High => "high",
});

impl RiskLevel {
    pub fn points(&self) -> u8 {
        match self {
            Self::Minimal => 1,
            Self::Low => 2,
            Self::Moderate => 3,
            Self::High => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn code_system_round_trip() {
        for (variant, s) in [
            (CodeSystem::Cpt, "cpt"),
            (CodeSystem::Hcpcs, "hcpcs"),
            (CodeSystem::Icd10, "icd10"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(CodeSystem::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn claim_status_round_trip() {
        for (variant, s) in [
            (ClaimStatus::Generated, "generated"),
            (ClaimStatus::Submitted, "submitted"),
            (ClaimStatus::Accepted, "accepted"),
            (ClaimStatus::Rejected, "rejected"),
            (ClaimStatus::Appealed, "appealed"),
            (ClaimStatus::Resubmitted, "resubmitted"),
            (ClaimStatus::Paid, "paid"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(ClaimStatus::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn source_priority_ordering() {
        assert!(CodeSource::DecisionEngine.priority() > CodeSource::Ai.priority());
        assert!(CodeSource::Ai.priority() > CodeSource::Sdoh.priority());
        assert!(CodeSource::Sdoh.priority() > CodeSource::Default.priority());
    }

    #[test]
    fn happy_path_transitions() {
        assert!(ClaimStatus::Generated.can_transition_to(ClaimStatus::Submitted));
        assert!(ClaimStatus::Submitted.can_transition_to(ClaimStatus::Accepted));
        assert!(ClaimStatus::Accepted.can_transition_to(ClaimStatus::Paid));
    }

    #[test]
    fn appeal_loop_transitions() {
        assert!(ClaimStatus::Submitted.can_transition_to(ClaimStatus::Rejected));
        assert!(ClaimStatus::Rejected.can_transition_to(ClaimStatus::Appealed));
        assert!(ClaimStatus::Appealed.can_transition_to(ClaimStatus::Resubmitted));
        assert!(ClaimStatus::Resubmitted.can_transition_to(ClaimStatus::Accepted));
    }

    #[test]
    fn illegal_transitions_rejected() {
        assert!(!ClaimStatus::Generated.can_transition_to(ClaimStatus::Paid));
        assert!(!ClaimStatus::Paid.can_transition_to(ClaimStatus::Generated));
        assert!(!ClaimStatus::Rejected.can_transition_to(ClaimStatus::Submitted));
        assert!(!ClaimStatus::Accepted.can_transition_to(ClaimStatus::Rejected));
    }

    #[test]
    fn mdm_points_scale() {
        assert_eq!(DataReview::Minimal.points(), 1);
        assert_eq!(DataReview::Extensive.points(), 4);
        assert_eq!(RiskLevel::Minimal.points(), 1);
        assert_eq!(RiskLevel::High.points(), 4);
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(CodeSystem::from_str("snomed").is_err());
        assert!(ClaimStatus::from_str("").is_err());
        assert!(DenialReason::from_str("other").is_err());
    }
}
