//! Structured audit events.
//!
//! The pipeline emits an event for every manual-review flag, fee
//! fallback-tier use, denial, and generated claim. Retention belongs to
//! the compliance collaborator; the sinks here either forward to
//! tracing or append to the local audit_events table.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{DenialReason, RateSource};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    EncounterDenied {
        encounter_id: Uuid,
        reason: DenialReason,
    },
    ManualReviewFlagged {
        encounter_id: Uuid,
        claim_id: Uuid,
        reasons: Vec<String>,
    },
    FeeFallbackUsed {
        encounter_id: Uuid,
        procedure_code: String,
        tier: RateSource,
    },
    ClaimGenerated {
        encounter_id: Uuid,
        claim_id: Uuid,
        total_charge: String,
        segment_count: u32,
    },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EncounterDenied { .. } => "encounter_denied",
            Self::ManualReviewFlagged { .. } => "manual_review_flagged",
            Self::FeeFallbackUsed { .. } => "fee_fallback_used",
            Self::ClaimGenerated { .. } => "claim_generated",
        }
    }

    pub fn encounter_id(&self) -> Uuid {
        match self {
            Self::EncounterDenied { encounter_id, .. }
            | Self::ManualReviewFlagged { encounter_id, .. }
            | Self::FeeFallbackUsed { encounter_id, .. }
            | Self::ClaimGenerated { encounter_id, .. } => *encounter_id,
        }
    }

    pub fn claim_id(&self) -> Option<Uuid> {
        match self {
            Self::ManualReviewFlagged { claim_id, .. } | Self::ClaimGenerated { claim_id, .. } => {
                Some(*claim_id)
            }
            _ => None,
        }
    }
}

/// Receives pipeline audit events. Implementations must not fail the
/// pipeline: recording problems are logged and swallowed.
pub trait AuditSink {
    fn record(&self, event: &AuditEvent);
}

/// Forwards events to the tracing subscriber.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        let detail = serde_json::to_string(event).unwrap_or_default();
        tracing::info!(kind = event.kind(), encounter = %event.encounter_id(), detail, "audit");
    }
}

/// Appends events to the local audit_events table.
pub struct SqliteAuditSink<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteAuditSink<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn insert(&self, event: &AuditEvent) -> Result<(), DatabaseError> {
        let detail = serde_json::to_string(event)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO audit_events (occurred_at, kind, encounter_id, claim_id, detail)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Utc::now().to_rfc3339(),
                event.kind(),
                event.encounter_id().to_string(),
                event.claim_id().map(|id| id.to_string()),
                detail,
            ],
        )?;
        Ok(())
    }
}

impl AuditSink for SqliteAuditSink<'_> {
    fn record(&self, event: &AuditEvent) {
        if let Err(e) = self.insert(event) {
            tracing::error!(kind = event.kind(), error = %e, "failed to record audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn sqlite_sink_appends_rows() {
        let conn = open_memory_database().unwrap();
        let sink = SqliteAuditSink::new(&conn);
        let encounter_id = Uuid::new_v4();
        let claim_id = Uuid::new_v4();

        sink.record(&AuditEvent::FeeFallbackUsed {
            encounter_id,
            procedure_code: "99213".into(),
            tier: RateSource::Reference,
        });
        sink.record(&AuditEvent::ManualReviewFlagged {
            encounter_id,
            claim_id,
            reasons: vec!["unlisted procedure".into()],
        });

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM audit_events WHERE encounter_id = ?1",
                params![encounter_id.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);

        let (kind, claim): (String, Option<String>) = conn
            .query_row(
                "SELECT kind, claim_id FROM audit_events WHERE kind = 'manual_review_flagged'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(kind, "manual_review_flagged");
        assert_eq!(claim, Some(claim_id.to_string()));
    }

    #[test]
    fn detail_serializes_event_payload() {
        let event = AuditEvent::EncounterDenied {
            encounter_id: Uuid::new_v4(),
            reason: DenialReason::AuthRequired,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"encounter_denied\""));
        assert!(json.contains("\"AuthRequired\""));
    }
}
