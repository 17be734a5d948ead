use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Participant identity as seen by the export surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: PlayerId,
    pub code: String,
    pub session_code: String,
}

impl Participant {
    pub fn new(id: u64, code: impl Into<String>, session_code: impl Into<String>) -> Self {
        Self {
            id: PlayerId(id),
            code: code.into(),
            session_code: session_code.into(),
        }
    }
}

/// A participant in a given round; round numbers are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerRound {
    pub player: PlayerId,
    pub round_number: u32,
}
