use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::CodeSystem;

/// Up to four billing modifiers, normalized to a canonical order so that
/// fee lookups and dedup keys are insensitive to input ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierSet(Vec<String>);

pub const MAX_MODIFIERS: usize = 4;

impl ModifierSet {
    /// Sorts, uppercases, dedups, and truncates to the four wire slots.
    pub fn new(mut modifiers: Vec<String>) -> Self {
        for m in &mut modifiers {
            *m = m.trim().to_ascii_uppercase();
        }
        modifiers.retain(|m| !m.is_empty());
        modifiers.sort();
        modifiers.dedup();
        modifiers.truncate(MAX_MODIFIERS);
        Self(modifiers)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// The four fee-schedule slot values, empty-padded. Lookup requires an
    /// exact match on all four slots including the empties.
    pub fn slots(&self) -> [String; 4] {
        let mut slots: [String; 4] = Default::default();
        for (i, m) in self.0.iter().enumerate() {
            slots[i] = m.clone();
        }
        slots
    }

    /// Canonical colon-joined form used in dedup keys and persistence.
    pub fn key(&self) -> String {
        self.0.join(":")
    }
}

/// One priced row of a fee schedule. The tuple (schedule, system, code,
/// slot1..slot4) is unique: 99213 and 99213+25 are distinct entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeScheduleEntry {
    pub id: Uuid,
    pub schedule_id: String,
    pub code_system: CodeSystem,
    pub code: String,
    pub modifiers: ModifierSet,
    pub price: Decimal,
    pub unit: String,
}
