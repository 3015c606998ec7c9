//! Pipeline node A: coverage eligibility.
//!
//! Hard gate: a failure here denies the encounter outright instead of
//! routing to manual review, because nothing downstream can repair a
//! missing patient or a lapsed policy.

use rusqlite::Connection;

use crate::db::{self, DatabaseError};
use crate::models::enums::DenialReason;
use crate::models::{Coverage, Encounter, Patient};

/// Outcome of the eligibility gate.
#[derive(Debug)]
pub enum EligibilityOutcome {
    Eligible { patient: Patient, coverage: Coverage },
    Denied(DenialReason),
}

/// Checks, in order: patient exists; a coverage exists for the billed
/// payer; the policy is active and in force on the service date; prior
/// authorization is present when the coverage requires it.
pub fn check(conn: &Connection, encounter: &Encounter) -> Result<EligibilityOutcome, DatabaseError> {
    let patient = match db::get_patient(conn, &encounter.patient_id)? {
        Some(p) => p,
        None => {
            tracing::warn!(patient_id = %encounter.patient_id, "eligibility: patient not found");
            return Ok(EligibilityOutcome::Denied(DenialReason::PatientNotFound));
        }
    };

    let coverages = db::list_coverages_for_patient(conn, &encounter.patient_id)?;
    let coverage = match coverages.into_iter().find(|c| c.payer_id == encounter.payer_id) {
        Some(c) => c,
        None => {
            tracing::warn!(
                patient_id = %encounter.patient_id,
                payer = %encounter.payer_id,
                "eligibility: no coverage for billed payer"
            );
            return Ok(EligibilityOutcome::Denied(DenialReason::PayerMismatch));
        }
    };

    if !coverage.policy_active || !coverage.in_force_on(encounter.service_date) {
        tracing::warn!(
            coverage_id = %coverage.id,
            service_date = %encounter.service_date,
            "eligibility: policy inactive or outside coverage window"
        );
        return Ok(EligibilityOutcome::Denied(DenialReason::InactivePolicy));
    }

    if coverage.requires_prior_auth && encounter.prior_auth_number.is_none() {
        tracing::warn!(coverage_id = %coverage.id, "eligibility: prior authorization missing");
        return Ok(EligibilityOutcome::Denied(DenialReason::AuthRequired));
    }

    Ok(EligibilityOutcome::Eligible { patient, coverage })
}
