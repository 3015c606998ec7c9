//! X12 837P serialization: the system's primary wire contract.

pub mod segment;
pub mod writer_837p;

pub use segment::{sanitize_field, strip_diagnosis_decimal, SegmentWriter};
pub use writer_837p::{serialize_837p, SerializedInterchange};

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::models::BillingProvider;

#[derive(Error, Debug)]
pub enum X12Error {
    #[error("Claim not serializable: {0}")]
    Invalid(String),
}

/// ISA15 usage indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageIndicator {
    Production,
    Test,
}

/// Everything the envelope needs beyond the claim itself. Carrying the
/// timestamp here keeps serialization a pure function.
#[derive(Debug, Clone)]
pub struct EnvelopeContext {
    pub sender_id: String,
    pub receiver_id: String,
    pub submitter_name: String,
    pub receiver_name: String,
    pub billing_provider: BillingProvider,
    pub usage: UsageIndicator,
    pub timestamp: NaiveDateTime,
}
