//! Pipeline node C: procedure CPT lookup.
//!
//! A supplied CPT is validated against the reference table; otherwise the
//! free-text procedure description is matched against active long
//! descriptions and the best-scoring code wins. Codes in the 99XXX
//! unlisted range always force manual review no matter how well they
//! scored, since payers want documentation attached to unlisted procedures.

use rusqlite::Connection;
use serde::Serialize;

use crate::db::{self, DatabaseError};
use crate::models::enums::CodeSystem;
use crate::models::Encounter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchBasis {
    SuppliedCode,
    DescriptionMatch,
    NoMatch,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcedureSelection {
    pub code: String,
    pub description: String,
    pub confidence: u8,
    pub is_unlisted: bool,
    pub basis: MatchBasis,
}

/// Unlisted-procedure range: 99XXX.
pub fn is_unlisted(code: &str) -> bool {
    code.len() == 5 && code.starts_with("99") && code.chars().all(|c| c.is_ascii_digit())
}

pub fn select(conn: &Connection, encounter: &Encounter) -> Result<ProcedureSelection, DatabaseError> {
    if let Some(supplied) = &encounter.cpt_code {
        if let Some(entry) = db::get_code(conn, CodeSystem::Cpt, supplied)? {
            if entry.is_active_on(encounter.service_date) {
                return Ok(ProcedureSelection {
                    code: entry.code,
                    description: entry.description,
                    confidence: 98,
                    is_unlisted: is_unlisted(supplied),
                    basis: MatchBasis::SuppliedCode,
                });
            }
        }
        tracing::warn!(code = %supplied, "supplied CPT not active, matching description instead");
    }

    if let Some(description) = &encounter.procedure_description {
        if let Some(selection) = match_description(conn, description, encounter)? {
            return Ok(selection);
        }
    }

    // Nothing validated and nothing matched: keep whatever the caller
    // supplied as the best-effort code so billing is not blocked, at a
    // confidence that guarantees human review.
    let code = encounter.cpt_code.clone().unwrap_or_else(|| "99499".into());
    Ok(ProcedureSelection {
        is_unlisted: is_unlisted(&code),
        description: String::new(),
        confidence: 30,
        basis: MatchBasis::NoMatch,
        code,
    })
}

/// Keyword-overlap match of the description against active CPT long
/// descriptions. Score = matched query tokens / query tokens.
fn match_description(
    conn: &Connection,
    description: &str,
    encounter: &Encounter,
) -> Result<Option<ProcedureSelection>, DatabaseError> {
    let query: Vec<String> = tokenize(description);
    if query.is_empty() {
        return Ok(None);
    }

    let mut best: Option<(usize, crate::models::CodeEntry)> = None;
    for entry in db::list_active_codes(conn, CodeSystem::Cpt)? {
        if !entry.is_active_on(encounter.service_date) {
            continue;
        }
        let target = tokenize(&entry.description);
        let matched = query.iter().filter(|t| target.contains(t)).count();
        if matched == 0 {
            continue;
        }
        let better = match &best {
            Some((score, _)) => matched > *score,
            None => true,
        };
        if better {
            best = Some((matched, entry));
        }
    }

    Ok(best.map(|(matched, entry)| {
        let confidence = ((matched * 100) / query.len()).min(95) as u8;
        ProcedureSelection {
            is_unlisted: is_unlisted(&entry.code),
            code: entry.code,
            description: entry.description,
            confidence,
            basis: MatchBasis::DescriptionMatch,
        }
    }))
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::{Documentation, EncounterFlags};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn encounter(cpt: Option<&str>, description: Option<&str>) -> Encounter {
        Encounter {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            provider_npi: None,
            payer_id: "AETNA".into(),
            service_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            place_of_service: 11,
            encounter_class: "procedure".into(),
            cpt_code: cpt.map(String::from),
            procedure_description: description.map(String::from),
            diagnosis_codes: vec![],
            new_patient: false,
            prior_auth_number: None,
            documentation: Documentation::default(),
            flags: EncounterFlags::default(),
        }
    }

    #[test]
    fn supplied_active_code_validates() {
        let conn = open_memory_database().unwrap();
        let sel = select(&conn, &encounter(Some("12001"), None)).unwrap();
        assert_eq!(sel.code, "12001");
        assert_eq!(sel.basis, MatchBasis::SuppliedCode);
        assert!(sel.confidence >= 90);
        assert!(!sel.is_unlisted);
    }

    #[test]
    fn retired_supplied_code_falls_back_to_description() {
        let conn = open_memory_database().unwrap();
        // 99201 is seeded retired
        let sel = select(&conn, &encounter(Some("99201"), Some("simple repair of superficial wounds"))).unwrap();
        assert_eq!(sel.basis, MatchBasis::DescriptionMatch);
        assert_eq!(sel.code, "12001");
    }

    #[test]
    fn description_match_finds_best_overlap() {
        let conn = open_memory_database().unwrap();
        let sel = select(&conn, &encounter(None, Some("drainage of simple abscess by incision"))).unwrap();
        assert_eq!(sel.code, "10060");
        assert_eq!(sel.basis, MatchBasis::DescriptionMatch);
        assert!(sel.confidence >= 70, "got {}", sel.confidence);
    }

    #[test]
    fn unlisted_code_is_flagged_even_when_valid() {
        let conn = open_memory_database().unwrap();
        // 99499 is seeded active but sits in the unlisted range
        let sel = select(&conn, &encounter(Some("99499"), None)).unwrap();
        assert_eq!(sel.basis, MatchBasis::SuppliedCode);
        assert!(sel.is_unlisted);
    }

    #[test]
    fn no_code_no_description_yields_low_confidence_unlisted() {
        let conn = open_memory_database().unwrap();
        let sel = select(&conn, &encounter(None, None)).unwrap();
        assert_eq!(sel.code, "99499");
        assert_eq!(sel.basis, MatchBasis::NoMatch);
        assert!(sel.is_unlisted);
        assert!(sel.confidence < 70);
    }

    #[test]
    fn gibberish_description_yields_no_match() {
        let conn = open_memory_database().unwrap();
        let sel = select(&conn, &encounter(None, Some("zzz qqq xyzzy"))).unwrap();
        assert_eq!(sel.basis, MatchBasis::NoMatch);
        assert!(sel.confidence < 70);
    }

    #[test]
    fn unlisted_range_boundaries() {
        assert!(is_unlisted("99499"));
        assert!(is_unlisted("99213")); // E/M codes share the range; node C is procedural-only
        assert!(!is_unlisted("12001"));
        assert!(!is_unlisted("9949"));
        assert!(!is_unlisted("994990"));
    }
}
