use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

// ═══════════════════════════════════════════
// Reference code tables
// ═══════════════════════════════════════════

pub fn get_code(
    conn: &Connection,
    system: CodeSystem,
    code: &str,
) -> Result<Option<CodeEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT system, code, description, status, effective_from, effective_to
         FROM code_entries WHERE system = ?1 AND code = ?2",
    )?;

    let result = stmt.query_row(params![system.as_str(), code], |row| {
        Ok(CodeRow {
            system: row.get::<_, String>(0)?,
            code: row.get::<_, String>(1)?,
            description: row.get::<_, String>(2)?,
            status: row.get::<_, String>(3)?,
            effective_from: row.get::<_, Option<String>>(4)?,
            effective_to: row.get::<_, Option<String>>(5)?,
        })
    });

    match result {
        Ok(row) => Ok(Some(code_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All active codes of a system, for description matching in the
/// procedure lookup node.
pub fn list_active_codes(
    conn: &Connection,
    system: CodeSystem,
) -> Result<Vec<CodeEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT system, code, description, status, effective_from, effective_to
         FROM code_entries WHERE system = ?1 AND status = 'active' ORDER BY code",
    )?;

    let rows = stmt.query_map(params![system.as_str()], |row| {
        Ok(CodeRow {
            system: row.get::<_, String>(0)?,
            code: row.get::<_, String>(1)?,
            description: row.get::<_, String>(2)?,
            status: row.get::<_, String>(3)?,
            effective_from: row.get::<_, Option<String>>(4)?,
            effective_to: row.get::<_, Option<String>>(5)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(code_from_row(row?)?);
    }
    Ok(out)
}

pub fn get_modifier(conn: &Connection, code: &str) -> Result<Option<ModifierEntry>, DatabaseError> {
    let result = conn.query_row(
        "SELECT code, description, status FROM modifier_entries WHERE code = ?1",
        params![code],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        },
    );

    match result {
        Ok((code, description, status)) => Ok(Some(ModifierEntry {
            code,
            description,
            status: CodeStatus::from_str(&status)?,
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

struct CodeRow {
    system: String,
    code: String,
    description: String,
    status: String,
    effective_from: Option<String>,
    effective_to: Option<String>,
}

fn code_from_row(row: CodeRow) -> Result<CodeEntry, DatabaseError> {
    Ok(CodeEntry {
        system: CodeSystem::from_str(&row.system)?,
        code: row.code,
        description: row.description,
        status: CodeStatus::from_str(&row.status)?,
        effective_from: row.effective_from.and_then(|d| parse_date(&d)),
        effective_to: row.effective_to.and_then(|d| parse_date(&d)),
    })
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

// ═══════════════════════════════════════════
// Patients & coverage
// ═══════════════════════════════════════════

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, first_name, last_name, date_of_birth, member_id,
         address_line, city, state, zip)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            patient.id.to_string(),
            patient.first_name,
            patient.last_name,
            patient.date_of_birth.map(|d| d.to_string()),
            patient.member_id,
            patient.address.line,
            patient.address.city,
            patient.address.state,
            patient.address.zip,
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, first_name, last_name, date_of_birth, member_id,
         address_line, city, state, zip
         FROM patients WHERE id = ?1",
        params![id.to_string()],
        |row| {
            Ok(PatientRow {
                id: row.get::<_, String>(0)?,
                first_name: row.get::<_, String>(1)?,
                last_name: row.get::<_, String>(2)?,
                date_of_birth: row.get::<_, Option<String>>(3)?,
                member_id: row.get::<_, Option<String>>(4)?,
                address_line: row.get::<_, Option<String>>(5)?,
                city: row.get::<_, Option<String>>(6)?,
                state: row.get::<_, Option<String>>(7)?,
                zip: row.get::<_, Option<String>>(8)?,
            })
        },
    );

    match result {
        Ok(row) => Ok(Some(patient_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

struct PatientRow {
    id: String,
    first_name: String,
    last_name: String,
    date_of_birth: Option<String>,
    member_id: Option<String>,
    address_line: Option<String>,
    city: Option<String>,
    state: Option<String>,
    zip: Option<String>,
}

fn patient_from_row(row: PatientRow) -> Result<Patient, DatabaseError> {
    Ok(Patient {
        id: parse_uuid(&row.id)?,
        first_name: row.first_name,
        last_name: row.last_name,
        date_of_birth: row.date_of_birth.and_then(|d| parse_date(&d)),
        member_id: row.member_id,
        address: Address {
            line: row.address_line,
            city: row.city,
            state: row.state,
            zip: row.zip,
        },
    })
}

pub fn insert_coverage(conn: &Connection, coverage: &Coverage) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO coverages (id, patient_id, payer_id, policy_active,
         effective_from, terminated_at, requires_prior_auth)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            coverage.id.to_string(),
            coverage.patient_id.to_string(),
            coverage.payer_id,
            coverage.policy_active as i32,
            coverage.effective_from.to_string(),
            coverage.terminated_at.map(|d| d.to_string()),
            coverage.requires_prior_auth as i32,
        ],
    )?;
    Ok(())
}

pub fn list_coverages_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Coverage>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, payer_id, policy_active, effective_from,
         terminated_at, requires_prior_auth
         FROM coverages WHERE patient_id = ?1 ORDER BY effective_from DESC",
    )?;

    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i32>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, i32>(6)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, patient_id, payer_id, active, from, term, prior_auth) = row?;
        out.push(Coverage {
            id: parse_uuid(&id)?,
            patient_id: parse_uuid(&patient_id)?,
            payer_id,
            policy_active: active != 0,
            effective_from: parse_date(&from).ok_or_else(|| {
                DatabaseError::ConstraintViolation(format!("bad effective_from: {from}"))
            })?,
            terminated_at: term.and_then(|d| parse_date(&d)),
            requires_prior_auth: prior_auth != 0,
        });
    }
    Ok(out)
}

// ═══════════════════════════════════════════
// Fee schedules
// ═══════════════════════════════════════════

pub fn insert_fee_entry(conn: &Connection, entry: &FeeScheduleEntry) -> Result<(), DatabaseError> {
    let slots = entry.modifiers.slots();
    conn.execute(
        "INSERT INTO fee_schedule_entries (id, schedule_id, code_system, code,
         modifier1, modifier2, modifier3, modifier4, price, unit)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.id.to_string(),
            entry.schedule_id,
            entry.code_system.as_str(),
            entry.code,
            slots[0],
            slots[1],
            slots[2],
            slots[3],
            entry.price.to_string(),
            entry.unit,
        ],
    )?;
    Ok(())
}

/// Exact match on all four normalized modifier slots: a code with
/// modifier 25 never matches the bare entry and vice versa.
pub fn lookup_fee_entry(
    conn: &Connection,
    schedule_id: &str,
    code_system: CodeSystem,
    code: &str,
    modifiers: &ModifierSet,
) -> Result<Option<FeeScheduleEntry>, DatabaseError> {
    let slots = modifiers.slots();
    let result = conn.query_row(
        "SELECT id, schedule_id, code_system, code, modifier1, modifier2,
         modifier3, modifier4, price, unit
         FROM fee_schedule_entries
         WHERE schedule_id = ?1 AND code_system = ?2 AND code = ?3
           AND modifier1 = ?4 AND modifier2 = ?5 AND modifier3 = ?6 AND modifier4 = ?7",
        params![schedule_id, code_system.as_str(), code, slots[0], slots[1], slots[2], slots[3]],
        |row| {
            Ok(FeeRow {
                id: row.get::<_, String>(0)?,
                schedule_id: row.get::<_, String>(1)?,
                code_system: row.get::<_, String>(2)?,
                code: row.get::<_, String>(3)?,
                modifiers: [
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ],
                price: row.get::<_, String>(8)?,
                unit: row.get::<_, String>(9)?,
            })
        },
    );

    match result {
        Ok(row) => Ok(Some(fee_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

struct FeeRow {
    id: String,
    schedule_id: String,
    code_system: String,
    code: String,
    modifiers: [String; 4],
    price: String,
    unit: String,
}

fn fee_from_row(row: FeeRow) -> Result<FeeScheduleEntry, DatabaseError> {
    Ok(FeeScheduleEntry {
        id: parse_uuid(&row.id)?,
        schedule_id: row.schedule_id,
        code_system: CodeSystem::from_str(&row.code_system)?,
        code: row.code,
        modifiers: ModifierSet::new(row.modifiers.into_iter().filter(|m| !m.is_empty()).collect()),
        price: parse_decimal(&row.price)?,
        unit: row.unit,
    })
}

// ═══════════════════════════════════════════
// Claims
// ═══════════════════════════════════════════

/// Persists the claim header, diagnosis list, and lines atomically.
pub fn insert_claim(conn: &Connection, claim: &Claim) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO claims (id, encounter_id, patient_id, payer_id, service_date,
         place_of_service, total_charge, isa_control, gs_control, st_control, status,
         manual_review, review_reasons, segment_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            claim.id.to_string(),
            claim.encounter_id.to_string(),
            claim.patient_id.to_string(),
            claim.payer_id,
            claim.service_date.to_string(),
            claim.place_of_service as i64,
            claim.total_charge.to_string(),
            claim.control_numbers.isa as i64,
            claim.control_numbers.gs as i64,
            claim.control_numbers.st as i64,
            claim.status.as_str(),
            claim.manual_review as i32,
            serde_json::to_string(&claim.review_reasons).unwrap_or_else(|_| "[]".into()),
            claim.segment_count,
        ],
    )?;

    for (i, dx) in claim.diagnoses.iter().enumerate() {
        tx.execute(
            "INSERT INTO claim_diagnoses (claim_id, position, code, description)
             VALUES (?1, ?2, ?3, ?4)",
            params![claim.id.to_string(), (i + 1) as i64, dx.code, dx.description],
        )?;
    }

    for line in &claim.lines {
        let pointers: Vec<String> = line.diagnosis_pointers.iter().map(|p| p.to_string()).collect();
        tx.execute(
            "INSERT INTO claim_lines (claim_id, line_number, procedure_code, modifiers,
             charge_amount, units, diagnosis_pointers, rate_source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                claim.id.to_string(),
                line.line_number as i64,
                line.procedure_code,
                line.modifiers.key(),
                line.charge_amount.to_string(),
                line.units as i64,
                pointers.join(","),
                line.rate_source.as_str(),
            ],
        )?;
    }

    tx.commit()?;
    Ok(())
}

pub fn get_claim(conn: &Connection, id: &Uuid) -> Result<Option<Claim>, DatabaseError> {
    let header = conn.query_row(
        "SELECT id, encounter_id, patient_id, payer_id, service_date, place_of_service,
         total_charge, isa_control, gs_control, st_control, status, manual_review,
         review_reasons, segment_count
         FROM claims WHERE id = ?1",
        params![id.to_string()],
        |row| {
            Ok(ClaimRow {
                id: row.get::<_, String>(0)?,
                encounter_id: row.get::<_, String>(1)?,
                patient_id: row.get::<_, String>(2)?,
                payer_id: row.get::<_, String>(3)?,
                service_date: row.get::<_, String>(4)?,
                place_of_service: row.get::<_, i64>(5)?,
                total_charge: row.get::<_, String>(6)?,
                isa: row.get::<_, i64>(7)?,
                gs: row.get::<_, i64>(8)?,
                st: row.get::<_, i64>(9)?,
                status: row.get::<_, String>(10)?,
                manual_review: row.get::<_, i32>(11)?,
                review_reasons: row.get::<_, Option<String>>(12)?,
                segment_count: row.get::<_, Option<i64>>(13)?,
            })
        },
    );

    let header = match header {
        Ok(row) => row,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut stmt = conn.prepare(
        "SELECT code, description FROM claim_diagnoses
         WHERE claim_id = ?1 ORDER BY position",
    )?;
    let diagnoses = stmt
        .query_map(params![id.to_string()], |row| {
            Ok(DiagnosisCode {
                code: row.get::<_, String>(0)?,
                description: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT line_number, procedure_code, modifiers, charge_amount, units,
         diagnosis_pointers, rate_source
         FROM claim_lines WHERE claim_id = ?1 ORDER BY line_number",
    )?;
    let line_rows = stmt
        .query_map(params![id.to_string()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut lines = Vec::with_capacity(line_rows.len());
    for (number, code, modifiers, charge, units, pointers, rate_source) in line_rows {
        lines.push(ClaimLine {
            line_number: number as u32,
            procedure_code: code,
            modifiers: ModifierSet::new(
                modifiers.split(':').filter(|m| !m.is_empty()).map(String::from).collect(),
            ),
            charge_amount: parse_decimal(&charge)?,
            units: units as u32,
            diagnosis_pointers: pointers
                .split(',')
                .filter_map(|p| p.parse::<u8>().ok())
                .collect(),
            rate_source: RateSource::from_str(&rate_source)?,
        });
    }

    Ok(Some(Claim {
        id: parse_uuid(&header.id)?,
        encounter_id: parse_uuid(&header.encounter_id)?,
        patient_id: parse_uuid(&header.patient_id)?,
        payer_id: header.payer_id,
        service_date: parse_date(&header.service_date).ok_or_else(|| {
            DatabaseError::ConstraintViolation(format!("bad service_date: {}", header.service_date))
        })?,
        place_of_service: header.place_of_service as u8,
        total_charge: parse_decimal(&header.total_charge)?,
        diagnoses,
        lines,
        control_numbers: ControlNumbers {
            isa: header.isa as u64,
            gs: header.gs as u64,
            st: header.st as u64,
        },
        status: ClaimStatus::from_str(&header.status)?,
        manual_review: header.manual_review != 0,
        review_reasons: header
            .review_reasons
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        segment_count: header.segment_count.map(|c| c as u32),
    }))
}

struct ClaimRow {
    id: String,
    encounter_id: String,
    patient_id: String,
    payer_id: String,
    service_date: String,
    place_of_service: i64,
    total_charge: String,
    isa: i64,
    gs: i64,
    st: i64,
    status: String,
    manual_review: i32,
    review_reasons: Option<String>,
    segment_count: Option<i64>,
}

/// Validated status transition: reads the current status, checks the
/// lifecycle, updates the header, and appends a history row atomically.
pub fn record_status_transition(
    conn: &Connection,
    claim_id: &Uuid,
    to: ClaimStatus,
    note: Option<&str>,
) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;

    let current: String = tx
        .query_row(
            "SELECT status FROM claims WHERE id = ?1",
            params![claim_id.to_string()],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DatabaseError::NotFound {
                entity_type: "claim".into(),
                id: claim_id.to_string(),
            },
            other => other.into(),
        })?;

    let from = ClaimStatus::from_str(&current)?;
    if !from.can_transition_to(to) {
        return Err(DatabaseError::ConstraintViolation(format!(
            "illegal claim status transition {from} -> {to}"
        )));
    }

    tx.execute(
        "UPDATE claims SET status = ?1 WHERE id = ?2",
        params![to.as_str(), claim_id.to_string()],
    )?;
    tx.execute(
        "INSERT INTO claim_status_history (claim_id, from_status, to_status, note)
         VALUES (?1, ?2, ?3, ?4)",
        params![claim_id.to_string(), from.as_str(), to.as_str(), note],
    )?;

    tx.commit()?;
    Ok(())
}

pub fn update_segment_count(
    conn: &Connection,
    claim_id: &Uuid,
    segment_count: u32,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE claims SET segment_count = ?1 WHERE id = ?2",
        params![segment_count as i64, claim_id.to_string()],
    )?;
    Ok(())
}

// ═══════════════════════════════════════════
// Shared parsing helpers
// ═══════════════════════════════════════════

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

fn parse_decimal(s: &str) -> Result<Decimal, DatabaseError> {
    Decimal::from_str(s).map_err(|e| DatabaseError::ConstraintViolation(format!("bad decimal {s}: {e}")))
}
