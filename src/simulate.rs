use iat_core::{Participant, Side};
use iat_experiment::{CaptureKeys, ExperimentConfig, RoundStats, TrialRunner};
use iat_store::TrialStore;
use iat_timing::Timer;
use rand::Rng;
use std::time::Duration;
use tracing::info;

/// Answers trials like a participant who sometimes presses the wrong key.
pub struct SimulatedParticipant<R: Rng> {
    rng: R,
    error_rate: f64,
    mean_rt_ms: u64,
}

impl<R: Rng> SimulatedParticipant<R> {
    pub fn new(rng: R, error_rate: f64, mean_rt_ms: u64) -> Self {
        Self {
            rng,
            error_rate: error_rate.clamp(0.0, 1.0),
            mean_rt_ms: mean_rt_ms.max(1),
        }
    }

    /// Key to press and how long to wait before pressing it.
    pub fn answer(&mut self, side: Side, keys: &CaptureKeys) -> (String, Duration) {
        let pressed = if self.rng.random_bool(self.error_rate) {
            side.opposite()
        } else {
            side
        };
        let half = self.mean_rt_ms / 2;
        let rt = self
            .rng
            .random_range(self.mean_rt_ms - half..=self.mean_rt_ms.saturating_add(half));
        (keys.binding(pressed).key.clone(), Duration::from_millis(rt))
    }
}

/// Plays every round of every participant. Returns per-participant totals.
///
/// The responder waits out each reaction time on `timer`, so a
/// `ManualTimer` finishes instantly while a `HighPrecisionTimer` plays in
/// real time.
pub fn play_session<S, R, T>(
    store: &S,
    config: &ExperimentConfig,
    participants: &[Participant],
    responder: &mut SimulatedParticipant<R>,
    timer: T,
) -> anyhow::Result<Vec<(String, RoundStats)>>
where
    S: TrialStore + ?Sized,
    R: Rng,
    T: Timer,
{
    let mut totals = Vec::with_capacity(participants.len());

    for p in participants {
        let mut total = RoundStats::default();
        for (round, block) in config.rounds() {
            let mut runner = TrialRunner::new(store, config, timer.clone(), p.id, round);
            while let Some(trial) = runner.next_trial() {
                let (key, rt) = responder.answer(trial.side, &config.capture_keys);
                timer.sleep(rt);
                runner.respond(&key)?;
            }
            let stats = runner.stats();
            info!(
                participant = %p.code,
                round,
                block = %block.label,
                answered = stats.answered,
                correct = stats.correct,
                "Round played"
            );
            total.answered += stats.answered;
            total.correct += stats.correct;
            total.total_time_ms += stats.total_time_ms;
        }
        totals.push((p.code.clone(), total));
    }
    Ok(totals)
}
