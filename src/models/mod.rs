pub mod enums;

pub mod candidate;
pub mod claim;
pub mod code_entry;
pub mod encounter;
pub mod fee;
pub mod party;

pub use candidate::{CandidateCode, DiagnosisCode, ProcedureCode, ReconciledCodeSet};
pub use claim::{Claim, ClaimLine, ControlNumbers};
pub use code_entry::{CodeEntry, ModifierEntry};
pub use encounter::{Documentation, Encounter, EncounterFlags};
pub use fee::{FeeScheduleEntry, ModifierSet};
pub use party::{Address, BillingProvider, Coverage, Patient};
