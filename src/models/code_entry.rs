use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::{CodeStatus, CodeSystem};

/// One row of a reference code table (CPT, HCPCS, ICD-10). The engine
/// consumes `status = active` entries only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeEntry {
    pub system: CodeSystem,
    pub code: String,
    pub description: String,
    pub status: CodeStatus,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
}

impl CodeEntry {
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        if self.status != CodeStatus::Active {
            return false;
        }
        if let Some(from) = self.effective_from {
            if date < from {
                return false;
            }
        }
        if let Some(to) = self.effective_to {
            if date > to {
                return false;
            }
        }
        true
    }
}

/// A billing modifier reference row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifierEntry {
    pub code: String,
    pub description: String,
    pub status: CodeStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(status: CodeStatus, from: Option<(i32, u32, u32)>, to: Option<(i32, u32, u32)>) -> CodeEntry {
        CodeEntry {
            system: CodeSystem::Cpt,
            code: "99213".into(),
            description: String::new(),
            status,
            effective_from: from.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap()),
            effective_to: to.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap()),
        }
    }

    #[test]
    fn retired_code_never_active() {
        let e = entry(CodeStatus::Retired, None, None);
        assert!(!e.is_active_on(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()));
    }

    #[test]
    fn active_without_dates() {
        let e = entry(CodeStatus::Active, None, None);
        assert!(e.is_active_on(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()));
    }

    #[test]
    fn effective_window_respected() {
        let e = entry(CodeStatus::Active, Some((2024, 1, 1)), Some((2024, 12, 31)));
        assert!(e.is_active_on(NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()));
        assert!(!e.is_active_on(NaiveDate::from_ymd_opt(2023, 7, 1).unwrap()));
        assert!(!e.is_active_on(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()));
    }
}
