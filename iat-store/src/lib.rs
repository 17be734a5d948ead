//! Trial record storage.
//!
//! Trials are created in one bulk insert per session and then updated at most
//! once each, when the participant responds. [`MemoryStore`] keeps everything
//! behind a single `RwLock`: a bulk insert is validated in full before any
//! record becomes visible, so a failed insert leaves the store unchanged.

use iat_core::{NewTrial, Participant, PlayerId, Response, Trial, TrialId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("trial {0} does not exist")]
    UnknownTrial(TrialId),

    #[error("participant {0} is not registered")]
    UnknownParticipant(PlayerId),

    #[error("trial {trial} of block {block} already exists for participant {player}")]
    DuplicateTrial { player: PlayerId, block: u32, trial: u32 },

    #[error("trial {0} already has a response")]
    DuplicateResponse(TrialId),

    #[error("participant {0} is listed more than once")]
    DuplicateParticipant(PlayerId),

    #[error(
        "participant {} is already registered as '{}' in session '{}'",
        .existing.id,
        .existing.code,
        .existing.session_code
    )]
    ParticipantConflict { existing: Participant },
}

/// Durable home of trial records
pub trait TrialStore: Send + Sync {
    fn participant(&self, id: PlayerId) -> Option<Participant>;

    /// Registers `participants` and inserts `trials`, all or nothing.
    ///
    /// A participant id may be given again only with the identity it was
    /// first registered with.
    fn bulk_insert(
        &self,
        participants: &[Participant],
        trials: Vec<NewTrial>,
    ) -> Result<Vec<TrialId>, StoreError>;

    fn get(&self, id: TrialId) -> Option<Trial>;

    /// Write-once update of the response fields.
    fn record_response(&self, id: TrialId, response: Response) -> Result<Trial, StoreError>;

    /// Trials of one participant in one block, ordered by `trial`.
    fn trial_page(&self, player: PlayerId, block: u32, offset: usize, limit: usize) -> Vec<Trial>;

    /// Every trial with its owning participant, in insertion order.
    fn snapshot(&self) -> Vec<(Participant, Trial)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct Inner {
    participants: BTreeMap<PlayerId, Participant>,
    trials: Vec<Trial>,
    // (player, block) -> indices into `trials`, sorted by trial number
    by_round: HashMap<(PlayerId, u32), Vec<usize>>,
}

impl Inner {
    fn index_of(&self, id: TrialId) -> Option<usize> {
        let idx = usize::try_from(id.0).ok()?.checked_sub(1)?;
        (idx < self.trials.len()).then_some(idx)
    }

    fn check_batch(
        &self,
        participants: &[Participant],
        trials: &[NewTrial],
    ) -> Result<(), StoreError> {
        let mut incoming = HashSet::with_capacity(participants.len());
        for p in participants {
            if !incoming.insert(p.id) {
                return Err(StoreError::DuplicateParticipant(p.id));
            }
            if let Some(existing) = self.participants.get(&p.id).filter(|e| *e != p) {
                return Err(StoreError::ParticipantConflict {
                    existing: existing.clone(),
                });
            }
        }

        let mut seen = HashSet::with_capacity(trials.len());
        for t in trials {
            if !self.participants.contains_key(&t.player) && !incoming.contains(&t.player) {
                return Err(StoreError::UnknownParticipant(t.player));
            }
            let existing = self.by_round.get(&(t.player, t.block)).is_some_and(|idx| {
                idx.iter().any(|&i| self.trials[i].trial == t.trial)
            });
            if existing || !seen.insert((t.player, t.block, t.trial)) {
                return Err(StoreError::DuplicateTrial {
                    player: t.player,
                    block: t.block,
                    trial: t.trial,
                });
            }
        }
        Ok(())
    }
}

/// In-memory [`TrialStore`]; ids are assigned sequentially from 1.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrialStore for MemoryStore {
    fn participant(&self, id: PlayerId) -> Option<Participant> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.participants.get(&id).cloned()
    }

    fn bulk_insert(
        &self,
        participants: &[Participant],
        trials: Vec<NewTrial>,
    ) -> Result<Vec<TrialId>, StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.check_batch(participants, &trials)?;

        for p in participants {
            inner.participants.entry(p.id).or_insert_with(|| p.clone());
        }

        let count = trials.len();
        let mut ids = Vec::with_capacity(count);
        let mut touched = HashSet::new();
        for new in trials {
            let idx = inner.trials.len();
            let id = TrialId(idx as u64 + 1);
            let key = (new.player, new.block);
            inner.trials.push(Trial::from_new(id, new));
            inner.by_round.entry(key).or_default().push(idx);
            touched.insert(key);
            ids.push(id);
        }

        let Inner { trials, by_round, .. } = &mut *inner;
        for key in touched {
            if let Some(idx) = by_round.get_mut(&key) {
                idx.sort_by_key(|&i| trials[i].trial);
            }
        }

        debug!(count, total = inner.trials.len(), "Bulk inserted trials");
        Ok(ids)
    }

    fn get(&self, id: TrialId) -> Option<Trial> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.index_of(id).map(|i| inner.trials[i].clone())
    }

    fn record_response(&self, id: TrialId, response: Response) -> Result<Trial, StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let idx = inner.index_of(id).ok_or(StoreError::UnknownTrial(id))?;
        let trial = &mut inner.trials[idx];
        if trial.is_answered() {
            warn!(trial = %id, key = %response.key, "Ignoring second response for trial");
            return Err(StoreError::DuplicateResponse(id));
        }
        trial.apply_response(response);
        Ok(trial.clone())
    }

    fn trial_page(&self, player: PlayerId, block: u32, offset: usize, limit: usize) -> Vec<Trial> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .by_round
            .get(&(player, block))
            .map(|idx| {
                idx.iter()
                    .skip(offset)
                    .take(limit)
                    .map(|&i| inner.trials[i].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn snapshot(&self) -> Vec<(Participant, Trial)> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .trials
            .iter()
            .filter_map(|t| {
                inner
                    .participants
                    .get(&t.player)
                    .map(|p| (p.clone(), t.clone()))
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).trials.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iat_core::Side;

    fn new_trial(player: u64, block: u32, trial: u32, word: &str) -> NewTrial {
        NewTrial {
            player: PlayerId(player),
            block,
            trial,
            stimulus: word.to_string(),
            stimulus_class: "concepts".into(),
            stimulus_level: "Science".into(),
            side: Side::Right,
        }
    }

    fn people() -> Vec<Participant> {
        vec![
            Participant::new(1, "abc1", "sess"),
            Participant::new(2, "abc2", "sess"),
        ]
    }

    fn store() -> MemoryStore {
        MemoryStore::new()
    }

    fn answer(key: &str, ms: u64) -> Response {
        Response {
            key: key.into(),
            correct: true,
            time_ms: ms,
        }
    }

    #[test]
    fn bulk_insert_assigns_sequential_ids() {
        let store = store();
        let ids = store
            .bulk_insert(
                &people(),
                vec![new_trial(1, 1, 1, "Math"), new_trial(1, 1, 2, "Physics")],
            )
            .unwrap();
        assert_eq!(ids, vec![TrialId(1), TrialId(2)]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(TrialId(2)).unwrap().stimulus, "Physics");
    }

    #[test]
    fn failed_bulk_insert_leaves_store_untouched() {
        let store = store();
        let err = store
            .bulk_insert(
                &people(),
                vec![new_trial(1, 1, 1, "Math"), new_trial(7, 1, 1, "Physics")],
            )
            .unwrap_err();
        assert_eq!(err, StoreError::UnknownParticipant(PlayerId(7)));
        assert!(store.is_empty());
        assert!(store.participant(PlayerId(1)).is_none());

        let err = store
            .bulk_insert(
                &people(),
                vec![new_trial(1, 1, 1, "Math"), new_trial(1, 1, 1, "Physics")],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateTrial { trial: 1, .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn duplicate_against_existing_rows_is_rejected() {
        let store = store();
        store.bulk_insert(&people(), vec![new_trial(1, 1, 1, "Math")]).unwrap();
        let err = store
            .bulk_insert(&people(), vec![new_trial(1, 1, 1, "Math")])
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateTrial { .. }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn responses_are_write_once() {
        let store = store();
        let ids = store.bulk_insert(&people(), vec![new_trial(1, 1, 1, "Math")]).unwrap();

        let first = store.record_response(ids[0], answer("I", 512)).unwrap();
        assert_eq!(first.response_time_ms, Some(512));

        let err = store.record_response(ids[0], answer("E", 90)).unwrap_err();
        assert_eq!(err, StoreError::DuplicateResponse(ids[0]));

        let stored = store.get(ids[0]).unwrap();
        assert_eq!(stored.response_key.as_deref(), Some("I"));
        assert_eq!(stored.response_time_ms, Some(512));
    }

    #[test]
    fn unknown_trial_response_is_an_error() {
        let store = store();
        assert_eq!(
            store.record_response(TrialId(0), answer("I", 1)).unwrap_err(),
            StoreError::UnknownTrial(TrialId(0))
        );
        assert!(store.get(TrialId(3)).is_none());
    }

    #[test]
    fn pages_follow_trial_order_not_insert_order() {
        let store = store();
        store
            .bulk_insert(
                &people(),
                vec![
                    new_trial(1, 2, 3, "c"),
                    new_trial(1, 2, 1, "a"),
                    new_trial(2, 2, 1, "other"),
                    new_trial(1, 2, 2, "b"),
                ],
            )
            .unwrap();

        let words: Vec<_> = store
            .trial_page(PlayerId(1), 2, 0, 10)
            .into_iter()
            .map(|t| t.stimulus)
            .collect();
        assert_eq!(words, ["a", "b", "c"]);

        let page = store.trial_page(PlayerId(1), 2, 1, 1);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].trial, 2);
        assert!(store.trial_page(PlayerId(1), 5, 0, 10).is_empty());
    }

    #[test]
    fn snapshot_joins_participants() {
        let store = store();
        store
            .bulk_insert(
                &people(),
                vec![new_trial(2, 1, 1, "Math"), new_trial(1, 1, 1, "Arts")],
            )
            .unwrap();
        let snap = store.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].0.code, "abc2");
        assert_eq!(snap[1].1.stimulus, "Arts");
    }

    #[test]
    fn concurrent_responses_on_disjoint_trials() {
        let store = std::sync::Arc::new(store());
        let trials = (1..=20)
            .map(|i| new_trial(1 + u64::from(i % 2), 1, i, "w"))
            .collect();
        let ids = store.bulk_insert(&people(), trials).unwrap();

        let handles: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let store = store.clone();
                std::thread::spawn(move || store.record_response(id, answer("E", 300)))
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap().is_ok());
        }
        assert!(store.snapshot().iter().all(|(_, t)| t.is_answered()));
    }

    #[test]
    fn participants_are_registered_with_their_trials() {
        let store = store();
        store.bulk_insert(&people(), vec![new_trial(1, 1, 1, "Math")]).unwrap();
        assert_eq!(store.participant(PlayerId(2)).unwrap().code, "abc2");

        // same identity again is fine
        store.bulk_insert(&people(), vec![new_trial(1, 2, 1, "Math")]).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn conflicting_identity_is_rejected_without_changes() {
        let store = store();
        store.bulk_insert(&people(), vec![new_trial(1, 1, 1, "Math")]).unwrap();

        let renamed = [Participant::new(1, "pX", "s2")];
        let err = store
            .bulk_insert(&renamed, vec![new_trial(1, 2, 1, "Arts")])
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::ParticipantConflict {
                existing: Participant::new(1, "abc1", "sess"),
            }
        );
        assert_eq!(store.participant(PlayerId(1)).unwrap().session_code, "sess");
        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot()[0].0.code, "abc1");
    }

    #[test]
    fn repeated_id_in_one_batch_is_rejected() {
        let store = store();
        let twice = [Participant::new(3, "a", "s"), Participant::new(3, "b", "s")];
        let err = store
            .bulk_insert(&twice, vec![new_trial(3, 1, 1, "Math")])
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateParticipant(PlayerId(3)));
        assert!(store.participant(PlayerId(3)).is_none());
        assert!(store.is_empty());
    }
}
