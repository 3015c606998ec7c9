//! Billing pipeline orchestrator.
//!
//! Single entry point that drives an encounter end to end:
//! decision engine → reconciliation (with external suggestion sources)
//! → assembly (fee lookups) → X12 837P serialization → persistence.
//!
//! External collaborators come in through traits (CandidateSource,
//! AuditSink) so the orchestrator stays fully testable with mock
//! implementations. One invocation per encounter; the control number
//! sequencer is the only shared state.

use rusqlite::Connection;
use thiserror::Error;

use crate::assemble::{self, AssemblyError, ReviewFlags};
use crate::audit::{AuditEvent, AuditSink};
use crate::db::{self, DatabaseError};
use crate::engine::{DecisionEngine, Disposition, EngineConfig, EngineError};
use crate::fees::{FeeResolver, FeeResolverConfig};
use crate::models::enums::DenialReason;
use crate::models::{Claim, ControlNumbers, Encounter};
use crate::reconcile::{CandidateSource, Reconciler};
use crate::sequence::{ControlNumberSequencer, OverflowPolicy, SequenceError, SequenceName};
use crate::x12::{serialize_837p, EnvelopeContext, SerializedInterchange, X12Error};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Engine failed: {0}")]
    Engine(#[from] EngineError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Assembly failed: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("Control number draw failed: {0}")]
    Sequence(#[from] SequenceError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] X12Error),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// What one pipeline run produced. Never silent: a claim is generated,
/// flagged for review, or denied with a reason.
#[derive(Debug)]
pub enum BillingOutcome {
    Denied {
        reason: DenialReason,
    },
    Generated {
        claim: Claim,
        interchange: SerializedInterchange,
        /// Scenario name when the engine took the fast path.
        fast_path: Option<&'static str>,
    },
}

pub struct BillingProcessor<'c> {
    conn: &'c Connection,
    engine_config: EngineConfig,
    fee_config: FeeResolverConfig,
    reconciler: Reconciler,
    overflow_policy: OverflowPolicy,
}

impl<'c> BillingProcessor<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            engine_config: EngineConfig::default(),
            fee_config: FeeResolverConfig::default(),
            reconciler: Reconciler::default(),
            overflow_policy: OverflowPolicy::default(),
        }
    }

    pub fn with_configs(
        conn: &'c Connection,
        engine_config: EngineConfig,
        fee_config: FeeResolverConfig,
        overflow_policy: OverflowPolicy,
    ) -> Self {
        Self {
            conn,
            engine_config,
            fee_config,
            reconciler: Reconciler::default(),
            overflow_policy,
        }
    }

    /// Run the full pipeline for one encounter.
    ///
    /// 1. Decision engine (eligibility gate, classification, coding)
    /// 2. Merge external suggestions at fixed priority
    /// 3. Assemble claim lines with fee lookups
    /// 4. Serialize the 837P interchange
    /// 5. Persist claim + tallies, emit audit events
    pub fn process(
        &self,
        encounter: &Encounter,
        sources: &[&dyn CandidateSource],
        context: &EnvelopeContext,
        audit: &dyn AuditSink,
    ) -> Result<BillingOutcome, PipelineError> {
        let engine = DecisionEngine::with_config(self.conn, self.engine_config.clone());
        let result = engine.evaluate(encounter)?;

        if let Disposition::Denied(reason) = result.disposition {
            audit.record(&AuditEvent::EncounterDenied { encounter_id: encounter.id, reason });
            return Ok(BillingOutcome::Denied { reason });
        }

        let patient = result
            .patient
            .clone()
            .ok_or_else(|| PipelineError::Validation("patient missing after eligibility".into()))?;

        // External suggestions are merged at fixed priority below the
        // engine; an unavailable collaborator costs its candidates, not
        // the claim.
        let mut candidates = result.candidates.clone();
        for source in sources {
            match source.collect(encounter) {
                Ok(list) => candidates.extend(list),
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %e, "suggestion source skipped");
                }
            }
        }
        let reconciled = self.reconciler.reconcile(candidates);

        let sequencer = ControlNumberSequencer::with_policy(self.conn, self.overflow_policy);
        let control_numbers = ControlNumbers {
            isa: sequencer.next(SequenceName::Isa)?,
            gs: sequencer.next(SequenceName::Gs)?,
            st: sequencer.next(SequenceName::St)?,
        };

        let resolver = FeeResolver::standard(self.conn, &self.fee_config, &encounter.payer_id);
        let manual_review = result.disposition == Disposition::ManualReviewRequired;
        let mut claim = assemble::assemble(
            encounter,
            &reconciled,
            &resolver,
            control_numbers,
            ReviewFlags { manual_review, reasons: result.review_reasons.clone() },
        )?;

        for line in &claim.lines {
            if line.rate_source != crate::models::enums::RateSource::Contracted {
                audit.record(&AuditEvent::FeeFallbackUsed {
                    encounter_id: encounter.id,
                    procedure_code: line.procedure_code.clone(),
                    tier: line.rate_source,
                });
            }
        }

        let interchange = serialize_837p(&claim, &patient, context)?;
        claim.segment_count = Some(interchange.segment_count);
        db::insert_claim(self.conn, &claim)?;

        if manual_review {
            audit.record(&AuditEvent::ManualReviewFlagged {
                encounter_id: encounter.id,
                claim_id: claim.id,
                reasons: claim.review_reasons.clone(),
            });
        }
        audit.record(&AuditEvent::ClaimGenerated {
            encounter_id: encounter.id,
            claim_id: claim.id,
            total_charge: claim.total_charge.to_string(),
            segment_count: interchange.segment_count,
        });
        tracing::info!(
            claim = %claim.id,
            encounter = %encounter.id,
            total = %claim.total_charge,
            review = manual_review,
            "claim generated"
        );

        Ok(BillingOutcome::Generated { claim, interchange, fast_path: result.fast_path })
    }
}
