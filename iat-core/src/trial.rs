use crate::participant::PlayerId;
use crate::stimulus::Side;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrialId(pub u64);

impl fmt::Display for TrialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Generation-time fields of a trial, before it is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTrial {
    pub player: PlayerId,
    pub block: u32,
    pub trial: u32,
    pub stimulus: String,
    pub stimulus_class: String,
    pub stimulus_level: String,
    pub side: Side,
}

/// The participant's answer to one trial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub key: String,
    pub correct: bool,
    pub time_ms: u64,
}

/// Stored trial record.
///
/// The three `response_*` fields stay `None` until the participant answers
/// and are written exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trial {
    pub id: TrialId,
    pub player: PlayerId,
    pub block: u32,
    pub trial: u32,
    pub stimulus: String,
    pub stimulus_class: String,
    pub stimulus_level: String,
    #[serde(skip_serializing)]
    pub side: Side,
    pub response_key: Option<String>,
    pub response_correct: Option<bool>,
    pub response_time_ms: Option<u64>,
}

impl Trial {
    pub fn from_new(id: TrialId, new: NewTrial) -> Self {
        Self {
            id,
            player: new.player,
            block: new.block,
            trial: new.trial,
            stimulus: new.stimulus,
            stimulus_class: new.stimulus_class,
            stimulus_level: new.stimulus_level,
            side: new.side,
            response_key: None,
            response_correct: None,
            response_time_ms: None,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.response_key.is_some()
    }

    pub fn response(&self) -> Option<Response> {
        Some(Response {
            key: self.response_key.clone()?,
            correct: self.response_correct?,
            time_ms: self.response_time_ms?,
        })
    }

    pub fn apply_response(&mut self, response: Response) {
        self.response_key = Some(response.key);
        self.response_correct = Some(response.correct);
        self.response_time_ms = Some(response.time_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_trial() -> NewTrial {
        NewTrial {
            player: PlayerId(1),
            block: 3,
            trial: 7,
            stimulus: "Physics".into(),
            stimulus_class: "concepts".into(),
            stimulus_level: "Science".into(),
            side: Side::Right,
        }
    }

    #[test]
    fn fresh_trial_has_no_response() {
        let trial = Trial::from_new(TrialId(9), new_trial());
        assert!(!trial.is_answered());
        assert_eq!(trial.response(), None);
        assert_eq!(trial.block, 3);
        assert_eq!(trial.side, Side::Right);
    }

    #[test]
    fn apply_response_fills_all_fields() {
        let mut trial = Trial::from_new(TrialId(9), new_trial());
        trial.apply_response(Response {
            key: "I".into(),
            correct: true,
            time_ms: 612,
        });
        assert!(trial.is_answered());
        assert_eq!(trial.response_time_ms, Some(612));
        assert_eq!(trial.response().map(|r| r.correct), Some(true));
    }
}
