use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Premium,
}

impl PlanTier {
    /// Monthly credit ceiling. `None` means unlimited.
    pub fn credit_limit(self, free_monthly_credits: u32) -> Option<u32> {
        match self {
            PlanTier::Free => Some(free_monthly_credits),
            PlanTier::Premium => None,
        }
    }

    pub fn is_premium(self) -> bool {
        matches!(self, PlanTier::Premium)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Premium => "premium",
        }
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(PlanTier::Free),
            "premium" => Ok(PlanTier::Premium),
            other => Err(format!("unknown plan '{other}'")),
        }
    }
}
