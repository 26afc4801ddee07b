use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Consultation,
    Document,
    Analysis,
}

impl ActionKind {
    pub const ALL: [ActionKind; 3] = [
        ActionKind::Consultation,
        ActionKind::Document,
        ActionKind::Analysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Consultation => "consultation",
            ActionKind::Document => "document",
            ActionKind::Analysis => "analysis",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "consultation" => Some(ActionKind::Consultation),
            "document" => Some(ActionKind::Document),
            "analysis" => Some(ActionKind::Analysis),
            _ => None,
        }
    }
}

impl Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
