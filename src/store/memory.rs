//! In-memory port implementations.
//!
//! The identity store is an immutable snapshot with prebuilt lookup
//! indexes; the unresolved and archive stores keep their rows behind a
//! `tokio::sync::RwLock`. Used by the test suites and as a stub when no
//! database is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use smallvec::SmallVec;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{
    AliasEntry, ArchivedBatch, CanonicalIdentity, ImportBatch, ImportStatus, NewUnresolved,
    Position, UnresolvedEntity, UnresolvedStatus,
};
use crate::ports::{ArchiveStore, IdentityStore, UnresolvedStore};

// ── Identity snapshot ─────────────────────────────────────────

/// Immutable identity snapshot with name and alias indexes.
pub struct MemoryIdentityStore {
    identities: Vec<CanonicalIdentity>,
    /// normalized name → identity ids sharing it
    name_index: HashMap<String, SmallVec<[Uuid; 4]>>,
    /// normalized alias → identity id
    alias_index: HashMap<String, Uuid>,
}

impl MemoryIdentityStore {
    pub fn new(identities: Vec<CanonicalIdentity>, aliases: Vec<AliasEntry>) -> Self {
        let mut name_index: HashMap<String, SmallVec<[Uuid; 4]>> = HashMap::new();
        for identity in &identities {
            name_index
                .entry(identity.normalized_name.clone())
                .or_default()
                .push(identity.id);
        }
        let alias_index = aliases
            .into_iter()
            .map(|a| (a.normalized_alias, a.identity_id))
            .collect();
        Self {
            identities,
            name_index,
            alias_index,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    fn get(&self, id: Uuid) -> Option<&CanonicalIdentity> {
        self.identities.iter().find(|i| i.id == id)
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_normalized_name(
        &self,
        normalized: &str,
        position: Option<Position>,
        team: Option<&str>,
    ) -> Result<Vec<CanonicalIdentity>> {
        let Some(ids) = self.name_index.get(normalized) else {
            return Ok(Vec::new());
        };
        let hits = ids
            .iter()
            .filter_map(|id| self.get(*id))
            .filter(|identity| position.is_none_or(|p| identity.position == p))
            .filter(|identity| {
                team.is_none()
                    || identity
                        .team
                        .as_deref()
                        .zip(team)
                        .is_some_and(|(a, b)| a.eq_ignore_ascii_case(b))
            })
            .cloned()
            .collect();
        Ok(hits)
    }

    async fn find_alias(&self, normalized: &str) -> Result<Option<Uuid>> {
        Ok(self.alias_index.get(normalized).copied())
    }

    async fn fuzzy_candidates(
        &self,
        position: Option<Position>,
    ) -> Result<Vec<CanonicalIdentity>> {
        Ok(self
            .identities
            .iter()
            .filter(|identity| identity.status.is_resolvable())
            .filter(|identity| position.is_none_or(|p| identity.position == p))
            .cloned()
            .collect())
    }
}

// ── Unresolved review queue ───────────────────────────────────

#[derive(Default)]
pub struct MemoryUnresolvedStore {
    rows: RwLock<Vec<UnresolvedEntity>>,
}

#[async_trait]
impl UnresolvedStore for MemoryUnresolvedStore {
    async fn find_open(&self, raw_name: &str, source: &str) -> Result<Option<UnresolvedEntity>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|r| {
                r.status == UnresolvedStatus::Open && r.raw_name == raw_name && r.source == source
            })
            .cloned())
    }

    async fn insert_open(&self, candidate: NewUnresolved) -> Result<UnresolvedEntity> {
        let mut rows = self.rows.write().await;
        // Uniqueness among open rows, enforced under the write lock the
        // way the database does it with its partial index.
        if let Some(existing) = rows.iter().find(|r| {
            r.status == UnresolvedStatus::Open
                && r.raw_name == candidate.raw_name
                && r.source == candidate.source
        }) {
            return Ok(existing.clone());
        }
        let row = UnresolvedEntity {
            id: Uuid::new_v4(),
            raw_name: candidate.raw_name,
            position: candidate.position,
            team: candidate.team,
            source: candidate.source,
            status: UnresolvedStatus::Open,
            resolved_identity_id: None,
            first_seen: Utc::now(),
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn mark_resolved(&self, id: Uuid, identity_id: Uuid) -> Result<bool> {
        let mut rows = self.rows.write().await;
        match rows
            .iter_mut()
            .find(|r| r.id == id && r.status == UnresolvedStatus::Open)
        {
            Some(row) => {
                row.status = UnresolvedStatus::Resolved;
                row.resolved_identity_id = Some(identity_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_open(&self, limit: i64) -> Result<Vec<UnresolvedEntity>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| r.status == UnresolvedStatus::Open)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

// ── Archive ───────────────────────────────────────────────────

/// Raw row as re-ingested by a replay.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub row_id: Uuid,
    pub batch_id: Uuid,
    pub target_table: String,
    pub payload: serde_json::Value,
    pub status: ImportStatus,
}

#[derive(Default)]
struct ArchiveState {
    batches: Vec<ArchivedBatch>,
    raw_rows: Vec<RawRow>,
    import_batches: Vec<ImportBatch>,
}

#[derive(Default)]
pub struct MemoryArchiveStore {
    state: RwLock<ArchiveState>,
}

impl MemoryArchiveStore {
    /// Test support: count re-ingested rows for one batch id.
    pub async fn raw_row_count(&self, batch_id: Uuid) -> usize {
        let state = self.state.read().await;
        state.raw_rows.iter().filter(|r| r.batch_id == batch_id).count()
    }

    /// Test support: all re-ingested rows across batches.
    pub async fn total_raw_rows(&self) -> usize {
        self.state.read().await.raw_rows.len()
    }

    /// Test support: the batch-metadata rows written so far.
    pub async fn import_batches(&self) -> Vec<ImportBatch> {
        self.state.read().await.import_batches.clone()
    }

    /// Test support: clobber a stored checksum so replay sees corruption.
    pub async fn corrupt_checksum_for_test(&self, batch_id: Uuid) {
        let mut state = self.state.write().await;
        if let Some(batch) = state.batches.iter_mut().find(|b| b.batch_id == batch_id) {
            batch.checksum = "0".repeat(64);
        }
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchiveStore {
    async fn insert_batch(&self, batch: ArchivedBatch) -> Result<()> {
        let mut state = self.state.write().await;
        state.batches.push(batch);
        Ok(())
    }

    async fn fetch_batch(&self, batch_id: Uuid) -> Result<Option<ArchivedBatch>> {
        let state = self.state.read().await;
        Ok(state
            .batches
            .iter()
            .find(|b| b.batch_id == batch_id)
            .cloned())
    }

    async fn record_replay(&self, batch_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(batch) = state.batches.iter_mut().find(|b| b.batch_id == batch_id) {
            batch.replay_count += 1;
            batch.last_replayed_at = Some(at);
        }
        Ok(())
    }

    async fn set_non_replayable(&self, batch_id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.batches.iter_mut().find(|b| b.batch_id == batch_id) {
            Some(batch) => {
                batch.can_replay = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_replayable(&self, limit: i64) -> Result<Vec<ArchivedBatch>> {
        let state = self.state.read().await;
        // Reverse insertion order first so a stable sort keeps the newest
        // of any archived_at tie in front.
        let mut eligible: Vec<ArchivedBatch> = state
            .batches
            .iter()
            .rev()
            .filter(|b| b.can_replay)
            .cloned()
            .collect();
        eligible.sort_by(|a, b| b.archived_at.cmp(&a.archived_at));
        eligible.truncate(limit.max(0) as usize);
        Ok(eligible)
    }

    async fn insert_raw_rows(
        &self,
        batch_id: Uuid,
        target_table: &str,
        rows: &[serde_json::Value],
    ) -> Result<usize> {
        let mut state = self.state.write().await;
        for payload in rows {
            state.raw_rows.push(RawRow {
                row_id: Uuid::new_v4(),
                batch_id,
                target_table: target_table.to_string(),
                payload: payload.clone(),
                status: ImportStatus::Pending,
            });
        }
        Ok(rows.len())
    }

    async fn insert_import_batch(&self, batch: ImportBatch) -> Result<()> {
        let mut state = self.state.write().await;
        state.import_batches.push(batch);
        Ok(())
    }
}
