//! Storage port traits for the pipeline.
//! Implemented by `store::postgres`; core logic depends only on these
//! traits, with `store::memory` serving tests and degraded operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{
    ArchivedBatch, CanonicalIdentity, ImportBatch, NewUnresolved, Position, UnresolvedEntity,
};

/// Read access to the canonical identity and alias tables. Both are owned
/// by external services; this pipeline never writes them.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Identities whose normalized name equals `normalized`, optionally
    /// narrowed by position and team. More than one row is possible; the
    /// resolver decides what a non-unique hit means.
    async fn find_by_normalized_name(
        &self,
        normalized: &str,
        position: Option<Position>,
        team: Option<&str>,
    ) -> Result<Vec<CanonicalIdentity>>;

    /// Curated alias lookup by compact normalized key.
    async fn find_alias(&self, normalized: &str) -> Result<Option<Uuid>>;

    /// Candidate pool for fuzzy matching: identities in a resolvable
    /// status (see [`crate::model::PlayerStatus::is_resolvable`]),
    /// narrowed by position when a hint is present.
    async fn fuzzy_candidates(&self, position: Option<Position>)
        -> Result<Vec<CanonicalIdentity>>;
}

/// Review queue for names that could not be resolved.
///
/// The `find_open` / `insert_open` pair is check-then-insert and therefore
/// not atomic on its own. Implementations backed by a real store must
/// enforce uniqueness on (raw_name, source) among open rows (the Postgres
/// implementation uses a partial unique index with `ON CONFLICT DO NOTHING`),
/// or callers must serialize resolution of the same raw name.
#[async_trait]
pub trait UnresolvedStore: Send + Sync {
    /// The open row for (raw_name, source), if one exists.
    async fn find_open(&self, raw_name: &str, source: &str) -> Result<Option<UnresolvedEntity>>;

    /// Insert a new open review row. Returns the row that is open after
    /// the call, which may be a pre-existing one under concurrent inserts.
    async fn insert_open(&self, candidate: NewUnresolved) -> Result<UnresolvedEntity>;

    /// Administrative action: close a review row with the identity it
    /// should have matched. Returns false when the row is missing or
    /// already resolved. Rows are never deleted.
    async fn mark_resolved(&self, id: Uuid, identity_id: Uuid) -> Result<bool>;

    /// Open rows, oldest first, bounded for review tooling.
    async fn list_open(&self, limit: i64) -> Result<Vec<UnresolvedEntity>>;
}

/// Durable storage for archived raw batches and their re-ingestions.
///
/// Replay of the same batch id is not guaranteed race-free; callers must
/// serialize per batch id (or take a store-level lock). Replays of
/// different batch ids are independent.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn insert_batch(&self, batch: ArchivedBatch) -> Result<()>;

    async fn fetch_batch(&self, batch_id: Uuid) -> Result<Option<ArchivedBatch>>;

    /// Bump `replay_count` and stamp `last_replayed_at`. The only mutation
    /// an archived batch ever sees besides `set_non_replayable`.
    async fn record_replay(&self, batch_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Flip `can_replay` off. Returns false when the batch is missing.
    /// There is deliberately no inverse operation.
    async fn set_non_replayable(&self, batch_id: Uuid) -> Result<bool>;

    /// Batches still eligible for replay, most recently archived first.
    async fn list_replayable(&self, limit: i64) -> Result<Vec<ArchivedBatch>>;

    /// Re-emit rows into the logical raw table under `batch_id` with fresh
    /// row identifiers and pending status. Returns the number inserted.
    async fn insert_raw_rows(
        &self,
        batch_id: Uuid,
        target_table: &str,
        rows: &[serde_json::Value],
    ) -> Result<usize>;

    /// Record the batch-metadata row that accompanies every ingestion.
    async fn insert_import_batch(&self, batch: ImportBatch) -> Result<()>;
}
