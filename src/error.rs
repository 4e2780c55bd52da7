//! Error taxonomy for the identity resolution and data integrity pipeline.
//!
//! Failure to resolve a name is *not* an error; it is an ordinary outcome
//! carried by [`crate::model::Resolution`]. This enum covers the conditions
//! that must stop a caller: store failures, integrity violations, and
//! archive corruption.

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A persistence call failed. Never folded into a "no match" result;
    /// callers own retry policy and must be able to tell the two apart.
    #[error("store failure: {0}")]
    Store(#[source] anyhow::Error),

    /// A sealed value bundle failed checksum verification while the guard
    /// is running in strict mode.
    #[error("integrity violation for entity {entity_id}: expected checksum {expected}, found {actual}")]
    IntegrityViolation {
        entity_id: Uuid,
        expected: String,
        actual: String,
    },

    #[error("archived batch not found: {0}")]
    ArchiveNotFound(Uuid),

    /// The batch exists but has been marked non-replayable by an operator.
    #[error("archived batch {0} is not replayable")]
    NotReplayable(Uuid),

    /// The decompressed archive payload no longer matches its stored
    /// checksum. Replay is refused; nothing is ingested.
    #[error("archived batch {batch_id} is corrupt: expected checksum {expected}, found {actual}")]
    ArchiveCorrupted {
        batch_id: Uuid,
        expected: String,
        actual: String,
    },

    #[error("payload codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Wrap an arbitrary store-layer failure.
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PipelineError::Store(anyhow::Error::new(err))
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::Store(anyhow::Error::new(err))
    }
}
