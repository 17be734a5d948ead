//! Session build: one generator call per (participant, round), one bulk insert.

use crate::config::ExperimentConfig;
use crate::generator::{GenerateError, generate};
use iat_core::{BlockDefinition, NewTrial, Participant, PlayerId, PlayerRound, StimulusCatalog};
use iat_store::{StoreError, TrialStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("round {round} for participant {player}: {source}")]
    Generate {
        player: PlayerId,
        round: u32,
        #[source]
        source: GenerateError,
    },

    #[error("participant {player} is in round {round} but only {rounds} blocks are configured")]
    RoundOutOfRange {
        player: PlayerId,
        round: u32,
        rounds: usize,
    },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Every participant in every round, round by round.
pub fn players_by_round(participants: &[Participant], num_rounds: usize) -> Vec<PlayerRound> {
    (1..=num_rounds as u32)
        .flat_map(|round_number| {
            participants.iter().map(move |p| PlayerRound {
                player: p.id,
                round_number,
            })
        })
        .collect()
}

/// Generates the trials for every (participant, round) pair.
///
/// Round `r` uses `blocks[r - 1]`. The first failure aborts the whole build
/// and no trials are returned.
pub fn build_all_trials<R: Rng + ?Sized>(
    players: &[PlayerRound],
    blocks: &[BlockDefinition],
    catalog: &StimulusCatalog,
    rng: &mut R,
) -> Result<Vec<NewTrial>, SessionError> {
    let mut trials = Vec::new();
    for pr in players {
        let block = (pr.round_number as usize)
            .checked_sub(1)
            .and_then(|i| blocks.get(i))
            .ok_or(SessionError::RoundOutOfRange {
                player: pr.player,
                round: pr.round_number,
                rounds: blocks.len(),
            })?;

        let generated =
            generate(block, catalog, rng).map_err(|source| SessionError::Generate {
                player: pr.player,
                round: pr.round_number,
                source,
            })?;

        trials.extend(generated.into_iter().map(|g| NewTrial {
            player: pr.player,
            block: pr.round_number,
            trial: g.trial,
            stimulus: g.stimulus,
            stimulus_class: g.stimulus_class,
            stimulus_level: g.stimulus_level,
            side: g.side,
        }));
    }
    Ok(trials)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_code: String,
    pub participants: usize,
    pub rounds: usize,
    pub trials: usize,
}

/// Builds sessions from one configuration and one randomness source.
///
/// The RNG lives as long as the builder, so consecutive sessions keep
/// drawing from the same stream instead of being re-seeded.
pub struct SessionBuilder<'a, R: Rng> {
    config: &'a ExperimentConfig,
    rng: R,
}

impl<'a> SessionBuilder<'a, StdRng> {
    /// Seeded builders are reproducible; unseeded ones draw from OS entropy.
    pub fn new(config: &'a ExperimentConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::with_rng(config, rng)
    }
}

impl<'a, R: Rng> SessionBuilder<'a, R> {
    pub fn with_rng(config: &'a ExperimentConfig, rng: R) -> Self {
        Self { config, rng }
    }

    /// Generates and stores all trials of a session.
    ///
    /// Participants are registered together with their trials, and only if
    /// every round of every participant generated cleanly and the store
    /// accepted the whole batch.
    pub fn build<S: TrialStore + ?Sized>(
        &mut self,
        store: &S,
        session_code: &str,
        participants: &[Participant],
    ) -> Result<SessionSummary, SessionError> {
        let rounds = self.config.num_rounds();
        let players = players_by_round(participants, rounds);
        debug!(
            session = session_code,
            participants = participants.len(),
            rounds,
            "Generating session trials"
        );

        let trials = build_all_trials(
            &players,
            &self.config.blocks,
            &self.config.stimuli,
            &mut self.rng,
        )?;
        let count = trials.len();

        store.bulk_insert(participants, trials)?;

        info!(session = session_code, trials = count, "Session trials created");
        Ok(SessionSummary {
            session_code: session_code.to_string(),
            participants: participants.len(),
            rounds,
            trials: count,
        })
    }
}
