//! Claim assembly: reconciled codes + fee lookups → an ordered set of
//! claim lines with diagnosis pointers and an exact total.
//!
//! CCM and other synthetic lines need no special handling: appending
//! one more procedure code to the reconciled set produces one more line
//! through the same path.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::fees::{FeeLookup, FeeResolver};
use crate::models::enums::ClaimStatus;
use crate::models::{Claim, ClaimLine, ControlNumbers, Encounter, ReconciledCodeSet};

/// Wire format carries at most four diagnosis pointers per service line.
const MAX_POINTERS: usize = 4;

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("Cannot assemble claim: {0}")]
    Validation(String),
}

/// Review flags carried from the engine run onto the claim record.
#[derive(Debug, Clone, Default)]
pub struct ReviewFlags {
    pub manual_review: bool,
    pub reasons: Vec<String>,
}

pub fn assemble(
    encounter: &Encounter,
    codes: &ReconciledCodeSet,
    resolver: &FeeResolver,
    control_numbers: ControlNumbers,
    review: ReviewFlags,
) -> Result<Claim, AssemblyError> {
    if codes.procedures.is_empty() {
        return Err(AssemblyError::Validation("no billable procedures in reconciled set".into()));
    }

    let diagnoses = codes.diagnoses();
    // Every line supports the principal first, then secondaries up to
    // the four-pointer cap.
    let pointers: Vec<u8> = (1..=diagnoses.len().min(MAX_POINTERS)).map(|p| p as u8).collect();

    let mut lines = Vec::with_capacity(codes.procedures.len());
    for (i, procedure) in codes.procedures.iter().enumerate() {
        let fee = resolver.resolve(&FeeLookup {
            code_system: procedure.system,
            code: procedure.code.clone(),
            modifiers: procedure.modifiers.clone(),
        });
        if fee.used_fallback() {
            tracing::info!(
                code = %procedure.code,
                tier = fee.rate_source.as_str(),
                "fee resolved from fallback tier"
            );
        }
        let units = procedure.units.max(1);
        lines.push(ClaimLine {
            line_number: (i + 1) as u32,
            procedure_code: procedure.code.clone(),
            modifiers: procedure.modifiers.clone(),
            charge_amount: fee.price * Decimal::from(units),
            units,
            diagnosis_pointers: pointers.clone(),
            rate_source: fee.rate_source,
        });
    }

    let total_charge: Decimal = lines.iter().map(|l| l.charge_amount).sum();

    let claim = Claim {
        id: Uuid::new_v4(),
        encounter_id: encounter.id,
        patient_id: encounter.patient_id,
        payer_id: encounter.payer_id.clone(),
        service_date: encounter.service_date,
        place_of_service: encounter.place_of_service,
        total_charge,
        diagnoses,
        lines,
        control_numbers,
        status: ClaimStatus::Generated,
        manual_review: review.manual_review,
        review_reasons: review.reasons,
        segment_count: None,
    };

    claim.check_integrity().map_err(AssemblyError::Validation)?;
    Ok(claim)
}
