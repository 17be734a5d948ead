use crate::config::CaptureKeys;
use iat_core::{Response, Trial, TrialId};
use iat_store::{StoreError, TrialStore};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseError {
    #[error("key '{0}' is not a capture key")]
    UnknownResponseKey(String),

    #[error("no trial is on screen")]
    NothingDisplayed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ResponseError {
    /// The trial was answered already; the first answer is kept.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ResponseError::Store(StoreError::DuplicateResponse(_)))
    }
}

/// Records a key press for a trial.
///
/// The answer is correct when the key belongs to the side the stimulus was
/// assigned to. Keys outside `keys` are rejected without touching the trial.
pub fn record_response<S: TrialStore + ?Sized>(
    store: &S,
    id: TrialId,
    key: &str,
    latency: Duration,
    keys: &CaptureKeys,
) -> Result<Trial, ResponseError> {
    let pressed = keys
        .side_for(key)
        .ok_or_else(|| ResponseError::UnknownResponseKey(key.to_string()))?;
    let trial = store.get(id).ok_or(StoreError::UnknownTrial(id))?;
    if trial.is_answered() {
        return Err(StoreError::DuplicateResponse(id).into());
    }

    let response = Response {
        key: key.to_string(),
        correct: pressed == trial.side,
        time_ms: latency.as_millis() as u64,
    };
    debug!(
        trial = %id,
        key,
        correct = response.correct,
        time_ms = response.time_ms,
        "Recording response"
    );
    Ok(store.record_response(id, response)?)
}
