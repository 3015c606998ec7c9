use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::candidate::DiagnosisCode;
use super::enums::{ClaimStatus, RateSource};
use super::fee::ModifierSet;

/// One service line of a professional claim.
///
/// `diagnosis_pointers` are 1-based positions into the claim's diagnosis
/// list; the wire format references positions, not codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimLine {
    /// 1-based, contiguous.
    pub line_number: u32,
    pub procedure_code: String,
    pub modifiers: ModifierSet,
    pub charge_amount: Decimal,
    pub units: u32,
    pub diagnosis_pointers: Vec<u8>,
    /// Which fee tier priced this line; kept for audit.
    pub rate_source: RateSource,
}

/// ISA/GS/ST envelope control numbers consumed from the sequencer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ControlNumbers {
    pub isa: u64,
    pub gs: u64,
    pub st: u64,
}

/// A generated professional claim. Immutable after generation except for
/// status transitions, which append to the status history table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: Uuid,
    pub encounter_id: Uuid,
    pub patient_id: Uuid,
    pub payer_id: String,
    pub service_date: NaiveDate,
    /// CMS place-of-service code carried into CLM05.
    pub place_of_service: u8,
    pub total_charge: Decimal,
    /// Ordered; index 0 = position 1 = principal diagnosis.
    pub diagnoses: Vec<DiagnosisCode>,
    pub lines: Vec<ClaimLine>,
    pub control_numbers: ControlNumbers,
    pub status: ClaimStatus,
    pub manual_review: bool,
    pub review_reasons: Vec<String>,
    /// Segment tally from serialization, persisted for audit.
    pub segment_count: Option<u32>,
}

impl Claim {
    /// Referential invariant: every pointer resolves to an existing
    /// 1-based diagnosis position and line numbers are contiguous from 1.
    pub fn check_integrity(&self) -> Result<(), String> {
        if self.diagnoses.is_empty() {
            return Err("claim has no diagnoses".into());
        }
        let max = self.diagnoses.len() as u8;
        for (i, line) in self.lines.iter().enumerate() {
            if line.line_number != (i + 1) as u32 {
                return Err(format!(
                    "line numbers not contiguous: expected {}, found {}",
                    i + 1,
                    line.line_number
                ));
            }
            if line.diagnosis_pointers.is_empty() {
                return Err(format!("line {} has no diagnosis pointers", line.line_number));
            }
            for p in &line.diagnosis_pointers {
                if *p == 0 || *p > max {
                    return Err(format!(
                        "line {} pointer {} outside diagnosis list (1..={})",
                        line.line_number, p, max
                    ));
                }
            }
        }
        let sum: Decimal = self.lines.iter().map(|l| l.charge_amount).sum();
        if sum != self.total_charge {
            return Err(format!(
                "total_charge {} does not equal line sum {}",
                self.total_charge, sum
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn line(n: u32, charge: &str, pointers: &[u8]) -> ClaimLine {
        ClaimLine {
            line_number: n,
            procedure_code: "99213".into(),
            modifiers: ModifierSet::empty(),
            charge_amount: Decimal::from_str(charge).unwrap(),
            units: 1,
            diagnosis_pointers: pointers.to_vec(),
            rate_source: RateSource::Contracted,
        }
    }

    fn claim_with(lines: Vec<ClaimLine>, total: &str) -> Claim {
        Claim {
            id: Uuid::new_v4(),
            encounter_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            payer_id: "MEDICARE".into(),
            service_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            place_of_service: 11,
            total_charge: Decimal::from_str(total).unwrap(),
            diagnoses: vec![
                DiagnosisCode { code: "I10".into(), description: String::new() },
                DiagnosisCode { code: "E11.9".into(), description: String::new() },
            ],
            lines,
            control_numbers: ControlNumbers { isa: 1, gs: 1, st: 1 },
            status: ClaimStatus::Generated,
            manual_review: false,
            review_reasons: vec![],
            segment_count: None,
        }
    }

    #[test]
    fn valid_claim_passes_integrity() {
        let claim = claim_with(vec![line(1, "125.00", &[1]), line(2, "40.50", &[1, 2])], "165.50");
        assert!(claim.check_integrity().is_ok());
    }

    #[test]
    fn pointer_out_of_range_fails() {
        let claim = claim_with(vec![line(1, "125.00", &[3])], "125.00");
        assert!(claim.check_integrity().is_err());
    }

    #[test]
    fn zero_pointer_fails() {
        let claim = claim_with(vec![line(1, "125.00", &[0])], "125.00");
        assert!(claim.check_integrity().is_err());
    }

    #[test]
    fn non_contiguous_lines_fail() {
        let claim = claim_with(vec![line(1, "10.00", &[1]), line(3, "10.00", &[1])], "20.00");
        assert!(claim.check_integrity().is_err());
    }

    #[test]
    fn total_mismatch_fails() {
        let claim = claim_with(vec![line(1, "10.00", &[1])], "11.00");
        assert!(claim.check_integrity().is_err());
    }
}
