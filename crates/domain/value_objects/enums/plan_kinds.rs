use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Trial,
    Basic,
    Premium,
    Corporate,
}

impl PlanKind {
    pub const ALL: [PlanKind; 4] = [
        PlanKind::Trial,
        PlanKind::Basic,
        PlanKind::Premium,
        PlanKind::Corporate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanKind::Trial => "trial",
            PlanKind::Basic => "basic",
            PlanKind::Premium => "premium",
            PlanKind::Corporate => "corporate",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trial" => Some(PlanKind::Trial),
            "basic" => Some(PlanKind::Basic),
            "premium" => Some(PlanKind::Premium),
            "corporate" => Some(PlanKind::Corporate),
            _ => None,
        }
    }

    /// The trial is granted once per user and never sold.
    pub fn is_purchasable(&self) -> bool {
        !matches!(self, PlanKind::Trial)
    }
}

impl Display for PlanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
