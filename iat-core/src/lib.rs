pub mod block;
pub mod participant;
pub mod stimulus;
pub mod trial;

pub use block::{BlockDefinition, BlockKind};
pub use participant::{Participant, PlayerId, PlayerRound};
pub use stimulus::{Side, StimulusCatalog, StimulusLabel, StimulusRef};
pub use trial::{NewTrial, Response, Trial, TrialId};
