use std::path::PathBuf;

use crate::contract::BoxError;

/// Failures surfaced while pacing a generator.
///
/// Everything except `Generator` and `Flush` is a caller contract violation;
/// none of them are retried or clamped away.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler used before initialisation")]
    NotInitialized,
    #[error("generator reported invalid step cost {cost}; costs must be finite and non-negative")]
    InvalidStepCost { cost: f32 },
    #[error("invalid frame delta {delta}s; expected a finite, non-negative duration")]
    InvalidFrameDelta { delta: f32 },
    #[error("cannot start a blocking run while an amortised run is still in flight")]
    RunInFlight,
    #[error("generator failed: {0}")]
    Generator(#[source] BoxError),
    #[error("gpu flush failed: {0}")]
    Flush(#[source] BoxError),
}

impl SchedulerError {
    pub(crate) fn generator<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Generator(Box::new(err))
    }
}

/// Fatal failures while acquiring the generator and its weights.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("failed to load weights from {path}: {source}")]
    Weights {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
    #[error("failed to construct generator: {0}")]
    Generator(#[source] BoxError),
}
