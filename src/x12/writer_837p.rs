//! 837P professional claim generation.
//!
//! Pure function over (claim, envelope context) → interchange text.
//! Segment order is the wire contract: ISA GS ST BHT, submitter and
//! receiver NM1, billing provider HL/PRV/NM1/N3/N4, subscriber
//! HL/SBR/NM1/DMG, CLM DTP HI, then LX/SV1 per line, closed by SE GE
//! IEA. Free text passes the sanitizer; missing identity fields emit
//! documented sentinels instead of failing the whole interchange.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::models::{Claim, Patient};
use crate::sequence::{render_control_number, SequenceName};

use super::segment::{sanitize_field, strip_diagnosis_decimal, SegmentWriter};
use super::{EnvelopeContext, UsageIndicator, X12Error};

/// Interchange control version for the ISA envelope.
const ISA_VERSION: &str = "00501";
/// Implementation convention for 837P professional claims.
const IMPLEMENTATION_REF: &str = "005010X222A1";

/// Sentinel NPI for a provider record missing one; flags the claim for
/// manual correction downstream rather than silently dropping it.
pub const FALLBACK_NPI: &str = "0000000000";
/// Fallback organization name when the billing provider has none.
pub const FALLBACK_ORG_NAME: &str = "UNKNOWN BILLING ENTITY";
/// Sentinel date of birth when demographics are incomplete.
pub const FALLBACK_DOB: &str = "19000101";

/// The serialized interchange plus the tallies persisted with the claim.
#[derive(Debug, Clone)]
pub struct SerializedInterchange {
    pub text: String,
    /// Every segment in the interchange, envelope included.
    pub segment_count: u32,
    /// Claims in the transaction set (one per invocation today).
    pub claim_count: u32,
}

pub fn serialize_837p(
    claim: &Claim,
    patient: &Patient,
    context: &EnvelopeContext,
) -> Result<SerializedInterchange, X12Error> {
    // Should be unreachable for claims that came through assembly, but
    // the wire contract is too expensive to corrupt to skip the guard.
    claim.check_integrity().map_err(X12Error::Invalid)?;

    let isa = render_control_number(SequenceName::Isa, claim.control_numbers.isa);
    let gs = render_control_number(SequenceName::Gs, claim.control_numbers.gs);
    let st = render_control_number(SequenceName::St, claim.control_numbers.st);

    let mut w = SegmentWriter::new();

    write_isa(&mut w, context, &isa);
    write_gs(&mut w, context, &gs);

    let st_index = w.count();
    w.segment("ST", &["837", &st, IMPLEMENTATION_REF]);
    write_bht(&mut w, claim, context.timestamp);
    write_submitter_receiver(&mut w, context);
    write_billing_provider(&mut w, context);
    write_subscriber(&mut w, claim, patient);
    write_claim_loop(&mut w, claim);

    // SE counts ST through SE inclusive.
    let se_count = w.count() - st_index + 1;
    w.segment("SE", &[&se_count.to_string(), &st]);
    w.segment("GE", &["1", &gs]);
    w.segment("IEA", &["1", &isa]);

    let (text, segment_count) = w.finish();
    Ok(SerializedInterchange { text, segment_count, claim_count: 1 })
}

fn write_isa(w: &mut SegmentWriter, context: &EnvelopeContext, isa: &str) {
    let usage = match context.usage {
        UsageIndicator::Production => "P",
        UsageIndicator::Test => "T",
    };
    w.segment(
        "ISA",
        &[
            "00",
            "          ",
            "00",
            "          ",
            "ZZ",
            &fixed_width(&context.sender_id, 15),
            "ZZ",
            &fixed_width(&context.receiver_id, 15),
            &context.timestamp.format("%y%m%d").to_string(),
            &context.timestamp.format("%H%M").to_string(),
            "^",
            ISA_VERSION,
            isa,
            "0",
            usage,
            ":",
        ],
    );
}

fn write_gs(w: &mut SegmentWriter, context: &EnvelopeContext, gs: &str) {
    w.segment(
        "GS",
        &[
            "HC",
            &sanitize_field(&context.sender_id),
            &sanitize_field(&context.receiver_id),
            &context.timestamp.format("%Y%m%d").to_string(),
            &context.timestamp.format("%H%M").to_string(),
            gs,
            "X",
            IMPLEMENTATION_REF,
        ],
    );
}

fn write_bht(w: &mut SegmentWriter, claim: &Claim, timestamp: NaiveDateTime) {
    w.segment(
        "BHT",
        &[
            "0019",
            "00",
            &sanitize_field(&claim.id.to_string()),
            &timestamp.format("%Y%m%d").to_string(),
            &timestamp.format("%H%M").to_string(),
            "CH",
        ],
    );
}

fn write_submitter_receiver(w: &mut SegmentWriter, context: &EnvelopeContext) {
    w.segment(
        "NM1",
        &[
            "41",
            "2",
            &sanitize_field(&context.submitter_name),
            "",
            "",
            "",
            "",
            "46",
            &sanitize_field(&context.sender_id),
        ],
    );
    w.segment(
        "NM1",
        &[
            "40",
            "2",
            &sanitize_field(&context.receiver_name),
            "",
            "",
            "",
            "",
            "46",
            &sanitize_field(&context.receiver_id),
        ],
    );
}

fn write_billing_provider(w: &mut SegmentWriter, context: &EnvelopeContext) {
    let provider = &context.billing_provider;
    w.segment("HL", &["1", "", "20", "1"]);
    if let Some(taxonomy) = &provider.taxonomy_code {
        w.segment("PRV", &["BI", "PXC", &sanitize_field(taxonomy)]);
    }

    let name = provider
        .organization_name
        .as_deref()
        .map(sanitize_field)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| FALLBACK_ORG_NAME.to_string());
    let npi = provider
        .npi
        .as_deref()
        .map(sanitize_field)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| FALLBACK_NPI.to_string());
    w.segment("NM1", &["85", "2", &name, "", "", "", "", "XX", &npi]);

    // Missing address pieces emit as empty elements rather than dropping
    // the segments.
    let address = &provider.address;
    w.segment("N3", &[&opt(&address.line)]);
    w.segment("N4", &[&opt(&address.city), &opt(&address.state), &opt(&address.zip)]);
}

fn write_subscriber(w: &mut SegmentWriter, claim: &Claim, patient: &Patient) {
    w.segment("HL", &["2", "1", "22", "0"]);
    w.segment("SBR", &["P", "18", "", "", "", "", "", "", "CI"]);

    let member_id = patient.member_id.as_deref().map(sanitize_field).unwrap_or_default();
    w.segment(
        "NM1",
        &[
            "IL",
            "1",
            &sanitize_field(&patient.last_name),
            &sanitize_field(&patient.first_name),
            "",
            "",
            "",
            "MI",
            &member_id,
        ],
    );
    w.segment("DMG", &["D8", &render_dob(patient.date_of_birth)]);

    w.segment("NM1", &["PR", "2", &sanitize_field(&claim.payer_id), "", "", "", "", "PI", &sanitize_field(&claim.payer_id)]);
}

fn write_claim_loop(w: &mut SegmentWriter, claim: &Claim) {
    // CLM05: place of service : facility qualifier : frequency code
    // (1 = original submission).
    w.segment(
        "CLM",
        &[
            &sanitize_field(&claim.id.to_string()),
            &amount(claim.total_charge),
            "",
            "",
            &format!("{:02}:B:1", claim.place_of_service),
            "Y",
            "A",
            "Y",
            "Y",
        ],
    );
    w.segment("DTP", &["472", "D8", &claim.service_date.format("%Y%m%d").to_string()]);

    // HI: BK qualifies the principal, BF each secondary, codes without
    // their decimal point.
    let mut hi: Vec<String> = Vec::with_capacity(claim.diagnoses.len());
    for (i, dx) in claim.diagnoses.iter().enumerate() {
        let qualifier = if i == 0 { "BK" } else { "BF" };
        hi.push(format!("{qualifier}:{}", strip_diagnosis_decimal(&dx.code)));
    }
    let hi_refs: Vec<&str> = hi.iter().map(String::as_str).collect();
    w.segment("HI", &hi_refs);

    for line in &claim.lines {
        w.segment("LX", &[&line.line_number.to_string()]);

        let mut composite = format!("HC:{}", sanitize_field(&line.procedure_code));
        for modifier in line.modifiers.as_slice() {
            composite.push(':');
            composite.push_str(&sanitize_field(modifier));
        }
        let pointers: Vec<String> = line.diagnosis_pointers.iter().map(|p| p.to_string()).collect();
        w.segment(
            "SV1",
            &[
                &composite,
                &amount(line.charge_amount),
                "UN",
                &line.units.to_string(),
                "",
                "",
                &pointers.join(":"),
            ],
        );
    }
}

/// Charges always carry two decimal places on the wire.
fn amount(value: Decimal) -> String {
    value.round_dp(2).to_string()
}

fn render_dob(dob: Option<NaiveDate>) -> String {
    match dob {
        Some(date) => date.format("%Y%m%d").to_string(),
        None => FALLBACK_DOB.to_string(),
    }
}

fn opt(field: &Option<String>) -> String {
    field.as_deref().map(sanitize_field).unwrap_or_default()
}

/// ISA sender/receiver IDs are fixed-width 15, space padded.
fn fixed_width(value: &str, width: usize) -> String {
    let mut out: String = sanitize_field(value).chars().take(width).collect();
    while out.chars().count() < width {
        out.push(' ');
    }
    out
}
