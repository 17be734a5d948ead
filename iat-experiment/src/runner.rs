use crate::config::{CaptureKeys, ExperimentConfig};
use crate::response::{ResponseError, record_response};
use iat_core::{PlayerId, Trial};
use iat_store::TrialStore;
use iat_timing::Timer;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

const DEFAULT_PAGE_SIZE: usize = 16;

/// A participant's trials for one round in `trial` order, fetched from the
/// store a page at a time.
pub struct PlayerTrials<'s, S: TrialStore + ?Sized> {
    store: &'s S,
    player: PlayerId,
    block: u32,
    page_size: usize,
    offset: usize,
    buffer: VecDeque<Trial>,
    exhausted: bool,
}

impl<'s, S: TrialStore + ?Sized> PlayerTrials<'s, S> {
    pub fn new(store: &'s S, player: PlayerId, block: u32) -> Self {
        Self::with_page_size(store, player, block, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(store: &'s S, player: PlayerId, block: u32, page_size: usize) -> Self {
        Self {
            store,
            player,
            block,
            page_size: page_size.max(1),
            offset: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fetch(&mut self) {
        let page = self
            .store
            .trial_page(self.player, self.block, self.offset, self.page_size);
        self.offset += page.len();
        self.exhausted = page.len() < self.page_size;
        self.buffer.extend(page);
    }
}

impl<S: TrialStore + ?Sized> Iterator for PlayerTrials<'_, S> {
    type Item = Trial;

    fn next(&mut self) -> Option<Trial> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch();
        }
        self.buffer.pop_front()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    Waiting,
    Displayed,
    Answered,
    Finished,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundStats {
    pub answered: usize,
    pub correct: usize,
    pub total_time_ms: u64,
}

/// Plays one participant's round: shows trials in order, times each key
/// press from the moment the stimulus was shown and waits the inter-trial
/// delay after every answer. Trials answered earlier are skipped, so a
/// round can be resumed.
pub struct TrialRunner<'a, S: TrialStore + ?Sized, T: Timer> {
    store: &'a S,
    keys: &'a CaptureKeys,
    timer: T,
    delay: Duration,
    trials: PlayerTrials<'a, S>,
    current: Option<Trial>,
    displayed_at: u64,
    state: TrialState,
    stats: RoundStats,
}

impl<'a, S, T> TrialRunner<'a, S, T>
where
    S: TrialStore + ?Sized,
    T: Timer,
{
    pub fn new(
        store: &'a S,
        config: &'a ExperimentConfig,
        timer: T,
        player: PlayerId,
        block: u32,
    ) -> Self {
        Self {
            store,
            keys: &config.capture_keys,
            timer,
            delay: Duration::from_millis(config.next_trial_delay_ms),
            trials: PlayerTrials::new(store, player, block),
            current: None,
            displayed_at: 0,
            state: TrialState::Waiting,
            stats: RoundStats::default(),
        }
    }

    /// Shows the next unanswered trial, or `None` once the round is done.
    ///
    /// Calling this while a trial is still on screen returns that trial.
    pub fn next_trial(&mut self) -> Option<&Trial> {
        if self.state == TrialState::Displayed {
            return self.current.as_ref();
        }
        match self.trials.by_ref().find(|t| !t.is_answered()) {
            Some(trial) => {
                self.displayed_at = self.timer.now();
                debug!(trial = %trial.id, stimulus = %trial.stimulus, "Stimulus shown");
                self.current = Some(trial);
                self.state = TrialState::Displayed;
            }
            None => {
                self.current = None;
                self.state = TrialState::Finished;
            }
        }
        self.current.as_ref()
    }

    /// Handles a key press for the trial on screen.
    ///
    /// Keys that are not capture keys are ignored and the trial stays up.
    pub fn respond(&mut self, key: &str) -> Result<Trial, ResponseError> {
        let id = match (&self.state, &self.current) {
            (TrialState::Displayed, Some(trial)) => trial.id,
            _ => return Err(ResponseError::NothingDisplayed),
        };
        let latency = self.timer.elapsed(self.displayed_at);

        match record_response(self.store, id, key, latency, self.keys) {
            Ok(trial) => {
                self.stats.answered += 1;
                if trial.response_correct == Some(true) {
                    self.stats.correct += 1;
                }
                self.stats.total_time_ms += trial.response_time_ms.unwrap_or_default();
                self.state = TrialState::Answered;
                self.timer.sleep(self.delay);
                Ok(trial)
            }
            Err(e) if e.is_duplicate() => {
                self.state = TrialState::Answered;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn stats(&self) -> RoundStats {
        self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.state == TrialState::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionBuilder;
    use iat_core::{Participant, Side};
    use iat_store::MemoryStore;
    use iat_timing::ManualTimer;

    fn setup() -> (ExperimentConfig, MemoryStore) {
        let config = ExperimentConfig::default();
        let store = MemoryStore::new();
        SessionBuilder::new(&config, Some(21))
            .build(&store, "s1", &[Participant::new(1, "p1", "s1")])
            .unwrap();
        (config, store)
    }

    #[test]
    fn pages_cover_the_round_in_order() {
        let (_, store) = setup();
        let trials: Vec<_> = PlayerTrials::with_page_size(&store, PlayerId(1), 3, 5).collect();
        assert_eq!(trials.len(), 28);
        for (i, t) in trials.iter().enumerate() {
            assert_eq!(t.trial as usize, i + 1);
            assert_eq!(t.block, 3);
        }
    }

    #[test]
    fn exact_page_multiple_terminates() {
        let (_, store) = setup();
        assert_eq!(PlayerTrials::with_page_size(&store, PlayerId(1), 1, 7).count(), 14);
        assert_eq!(PlayerTrials::new(&store, PlayerId(9), 1).count(), 0);
    }

    #[test]
    fn runner_times_and_scores_responses() {
        let (config, store) = setup();
        let timer = ManualTimer::new();
        let mut runner = TrialRunner::new(&store, &config, timer.clone(), PlayerId(1), 1);

        let side = runner.next_trial().unwrap().side;
        timer.advance(Duration::from_millis(480));
        let key = config.capture_keys.binding(side).key.clone();
        let trial = runner.respond(&key).unwrap();

        assert_eq!(trial.trial, 1);
        assert_eq!(trial.response_time_ms, Some(480));
        assert_eq!(trial.response_correct, Some(true));
        assert_eq!(runner.state(), TrialState::Answered);
        // inter-trial delay was slept on the shared clock
        assert_eq!(timer.now(), (480 + 250) * 1_000_000);

        let side = runner.next_trial().unwrap().side;
        let wrong = config.capture_keys.binding(side.opposite()).code.clone();
        let trial = runner.respond(&wrong).unwrap();
        assert_eq!(trial.trial, 2);
        assert_eq!(trial.response_correct, Some(false));
        assert_eq!(runner.stats(), RoundStats { answered: 2, correct: 1, total_time_ms: 480 });
    }

    #[test]
    fn non_capture_keys_keep_trial_on_screen() {
        let (config, store) = setup();
        let mut runner = TrialRunner::new(&store, &config, ManualTimer::new(), PlayerId(1), 2);
        let id = runner.next_trial().unwrap().id;
        assert!(matches!(
            runner.respond("Space"),
            Err(ResponseError::UnknownResponseKey(_))
        ));
        assert_eq!(runner.state(), TrialState::Displayed);
        assert_eq!(runner.next_trial().unwrap().id, id);
        runner.respond("E").unwrap();
    }

    #[test]
    fn respond_without_display_fails() {
        let (config, store) = setup();
        let mut runner = TrialRunner::new(&store, &config, ManualTimer::new(), PlayerId(1), 1);
        assert_eq!(runner.respond("E"), Err(ResponseError::NothingDisplayed));
        runner.next_trial();
        runner.respond("E").unwrap();
        assert_eq!(runner.respond("E"), Err(ResponseError::NothingDisplayed));
    }

    #[test]
    fn runner_finishes_and_resumes() {
        let (config, store) = setup();
        let mut first = TrialRunner::new(&store, &config, ManualTimer::new(), PlayerId(1), 5);
        for _ in 0..4 {
            first.next_trial().unwrap();
            first.respond("I").unwrap();
        }

        let mut resumed = TrialRunner::new(&store, &config, ManualTimer::new(), PlayerId(1), 5);
        let mut seen = 0;
        while let Some(trial) = resumed.next_trial() {
            assert!(trial.trial > 4);
            seen += 1;
            let key = if trial.side == Side::Left { "E" } else { "I" };
            resumed.respond(key).unwrap();
        }
        assert_eq!(seen, 10);
        assert!(resumed.is_finished());
        assert_eq!(resumed.stats().correct, 10);
    }
}
