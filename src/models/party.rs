use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Postal address as carried in the loop 2010 N3/N4 segments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Address {
    pub line: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

/// Patient demographics mirrored from the registration collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub member_id: Option<String>,
    pub address: Address,
}

/// Coverage record checked by the eligibility node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coverage {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub payer_id: String,
    pub policy_active: bool,
    pub effective_from: NaiveDate,
    pub terminated_at: Option<NaiveDate>,
    pub requires_prior_auth: bool,
}

impl Coverage {
    pub fn in_force_on(&self, date: NaiveDate) -> bool {
        if date < self.effective_from {
            return false;
        }
        match self.terminated_at {
            Some(term) => date <= term,
            None => true,
        }
    }
}

/// Billing provider identity for the 2000A/2010AA loops.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingProvider {
    pub organization_name: Option<String>,
    pub npi: Option<String>,
    pub taxonomy_code: Option<String>,
    pub address: Address,
}
