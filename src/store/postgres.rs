//! Postgres implementations of the pipeline ports.
//!
//! Runtime-bound `sqlx` queries against the `gridiron` schema (see
//! `migrations/0001_identity_pipeline.sql`). The identity and alias tables
//! are written by the identity-management and curation services; only the
//! unresolved queue and the archive tables are written here.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::model::{
    ArchivedBatch, CanonicalIdentity, ImportBatch, NewUnresolved, PlayerStatus, Position,
    UnresolvedEntity, UnresolvedStatus,
};
use crate::ports::{ArchiveStore, IdentityStore, UnresolvedStore};

type IdentityRow = (Uuid, String, String, String, Option<String>, String);

fn identity_from_row(row: IdentityRow) -> Result<CanonicalIdentity> {
    let (id, display_name, normalized_name, position, team, status) = row;
    let position = Position::parse(&position)
        .ok_or_else(|| PipelineError::Store(anyhow!("unknown position in players table: {position}")))?;
    let status = PlayerStatus::parse(&status)
        .ok_or_else(|| PipelineError::Store(anyhow!("unknown status in players table: {status}")))?;
    Ok(CanonicalIdentity {
        id,
        display_name,
        normalized_name,
        position,
        team,
        status,
    })
}

// ── Identity store ────────────────────────────────────────────

pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_normalized_name(
        &self,
        normalized: &str,
        position: Option<Position>,
        team: Option<&str>,
    ) -> Result<Vec<CanonicalIdentity>> {
        let rows: Vec<IdentityRow> = sqlx::query_as(
            r#"
            SELECT player_id, display_name, normalized_name, position, team, status
            FROM gridiron.players
            WHERE normalized_name = $1
              AND ($2::text IS NULL OR position = $2)
              AND ($3::text IS NULL OR lower(team) = lower($3))
            "#,
        )
        .bind(normalized)
        .bind(position.map(|p| p.as_str()))
        .bind(team)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(identity_from_row).collect()
    }

    async fn find_alias(&self, normalized: &str) -> Result<Option<Uuid>> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT player_id FROM gridiron.player_aliases
            WHERE normalized_alias = $1
            "#,
        )
        .bind(normalized)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id,)| id))
    }

    async fn fuzzy_candidates(
        &self,
        position: Option<Position>,
    ) -> Result<Vec<CanonicalIdentity>> {
        let resolvable: Vec<&str> = [
            PlayerStatus::Active,
            PlayerStatus::Inactive,
            PlayerStatus::InjuredReserve,
            PlayerStatus::PracticeSquad,
            PlayerStatus::Suspended,
        ]
        .iter()
        .map(|s| s.as_str())
        .collect();

        let rows: Vec<IdentityRow> = sqlx::query_as(
            r#"
            SELECT player_id, display_name, normalized_name, position, team, status
            FROM gridiron.players
            WHERE status = ANY($1)
              AND ($2::text IS NULL OR position = $2)
            "#,
        )
        .bind(&resolvable)
        .bind(position.map(|p| p.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(identity_from_row).collect()
    }
}

// ── Unresolved queue ──────────────────────────────────────────

type UnresolvedRow = (
    Uuid,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
    Option<Uuid>,
    DateTime<Utc>,
);

fn unresolved_from_row(row: UnresolvedRow) -> Result<UnresolvedEntity> {
    let (id, raw_name, position, team, source, status, resolved_identity_id, first_seen) = row;
    let position = match position {
        Some(p) => Some(Position::parse(&p).ok_or_else(|| {
            PipelineError::Store(anyhow!("unknown position in unresolved_entities: {p}"))
        })?),
        None => None,
    };
    let status = match status.as_str() {
        "open" => UnresolvedStatus::Open,
        "resolved" => UnresolvedStatus::Resolved,
        other => {
            return Err(PipelineError::Store(anyhow!(
                "unknown unresolved status: {other}"
            )))
        }
    };
    Ok(UnresolvedEntity {
        id,
        raw_name,
        position,
        team,
        source,
        status,
        resolved_identity_id,
        first_seen,
    })
}

pub struct PgUnresolvedStore {
    pool: PgPool,
}

impl PgUnresolvedStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnresolvedStore for PgUnresolvedStore {
    async fn find_open(&self, raw_name: &str, source: &str) -> Result<Option<UnresolvedEntity>> {
        let row: Option<UnresolvedRow> = sqlx::query_as(
            r#"
            SELECT unresolved_id, raw_name, position, team, source, status,
                   resolved_player_id, first_seen
            FROM gridiron.unresolved_entities
            WHERE raw_name = $1 AND source = $2 AND status = 'open'
            "#,
        )
        .bind(raw_name)
        .bind(source)
        .fetch_optional(&self.pool)
        .await?;
        row.map(unresolved_from_row).transpose()
    }

    async fn insert_open(&self, candidate: NewUnresolved) -> Result<UnresolvedEntity> {
        // The partial unique index on (raw_name, source) WHERE status =
        // 'open' makes the dedup atomic under concurrent resolution.
        sqlx::query(
            r#"
            INSERT INTO gridiron.unresolved_entities
                (unresolved_id, raw_name, position, team, source, status, first_seen)
            VALUES ($1, $2, $3, $4, $5, 'open', $6)
            ON CONFLICT (raw_name, source) WHERE status = 'open' DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&candidate.raw_name)
        .bind(candidate.position.map(|p| p.as_str()))
        .bind(&candidate.team)
        .bind(&candidate.source)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.find_open(&candidate.raw_name, &candidate.source)
            .await?
            .ok_or_else(|| {
                PipelineError::Store(anyhow!(
                    "open unresolved row vanished after insert for '{}' ({})",
                    candidate.raw_name,
                    candidate.source
                ))
            })
    }

    async fn mark_resolved(&self, id: Uuid, identity_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE gridiron.unresolved_entities
            SET status = 'resolved', resolved_player_id = $2
            WHERE unresolved_id = $1 AND status = 'open'
            "#,
        )
        .bind(id)
        .bind(identity_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_open(&self, limit: i64) -> Result<Vec<UnresolvedEntity>> {
        let rows: Vec<UnresolvedRow> = sqlx::query_as(
            r#"
            SELECT unresolved_id, raw_name, position, team, source, status,
                   resolved_player_id, first_seen
            FROM gridiron.unresolved_entities
            WHERE status = 'open'
            ORDER BY first_seen ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(unresolved_from_row).collect()
    }
}

// ── Archive ───────────────────────────────────────────────────

type BatchRow = (
    Uuid,
    String,
    String,
    Vec<u8>,
    i64,
    i64,
    i64,
    String,
    bool,
    i64,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
);

fn batch_from_row(row: BatchRow) -> ArchivedBatch {
    let (
        batch_id,
        source,
        target_table,
        compressed_payload,
        row_count,
        original_size,
        compressed_size,
        checksum,
        can_replay,
        replay_count,
        last_replayed_at,
        archived_at,
    ) = row;
    ArchivedBatch {
        batch_id,
        source,
        target_table,
        compressed_payload,
        row_count,
        original_size,
        compressed_size,
        checksum,
        can_replay,
        replay_count,
        last_replayed_at,
        archived_at,
    }
}

pub struct PgArchiveStore {
    pool: PgPool,
}

impl PgArchiveStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const BATCH_COLUMNS: &str = "batch_id, source, target_table, compressed_payload, row_count, \
     original_size, compressed_size, checksum, can_replay, replay_count, \
     last_replayed_at, archived_at";

#[async_trait]
impl ArchiveStore for PgArchiveStore {
    async fn insert_batch(&self, batch: ArchivedBatch) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO gridiron.archived_batches
                (batch_id, source, target_table, compressed_payload, row_count,
                 original_size, compressed_size, checksum, can_replay,
                 replay_count, last_replayed_at, archived_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(batch.batch_id)
        .bind(&batch.source)
        .bind(&batch.target_table)
        .bind(&batch.compressed_payload)
        .bind(batch.row_count)
        .bind(batch.original_size)
        .bind(batch.compressed_size)
        .bind(&batch.checksum)
        .bind(batch.can_replay)
        .bind(batch.replay_count)
        .bind(batch.last_replayed_at)
        .bind(batch.archived_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_batch(&self, batch_id: Uuid) -> Result<Option<ArchivedBatch>> {
        let row: Option<BatchRow> = sqlx::query_as(&format!(
            "SELECT {BATCH_COLUMNS} FROM gridiron.archived_batches WHERE batch_id = $1"
        ))
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(batch_from_row))
    }

    async fn record_replay(&self, batch_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE gridiron.archived_batches
            SET replay_count = replay_count + 1, last_replayed_at = $2
            WHERE batch_id = $1
            "#,
        )
        .bind(batch_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_non_replayable(&self, batch_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE gridiron.archived_batches
            SET can_replay = FALSE
            WHERE batch_id = $1
            "#,
        )
        .bind(batch_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_replayable(&self, limit: i64) -> Result<Vec<ArchivedBatch>> {
        let rows: Vec<BatchRow> = sqlx::query_as(&format!(
            "SELECT {BATCH_COLUMNS} FROM gridiron.archived_batches \
             WHERE can_replay ORDER BY archived_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(batch_from_row).collect())
    }

    async fn insert_raw_rows(
        &self,
        batch_id: Uuid,
        target_table: &str,
        rows: &[serde_json::Value],
    ) -> Result<usize> {
        // One transaction per replay generation so a failed insert leaves
        // nothing behind.
        let mut tx = self.pool.begin().await?;
        for payload in rows {
            sqlx::query(
                r#"
                INSERT INTO gridiron.raw_imports
                    (row_id, batch_id, target_table, payload, status, created_at)
                VALUES ($1, $2, $3, $4, 'pending', $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(batch_id)
            .bind(target_table)
            .bind(payload)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(rows.len())
    }

    async fn insert_import_batch(&self, batch: ImportBatch) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO gridiron.import_batches
                (batch_id, source, target_table, row_count, status, replay_of, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(batch.batch_id)
        .bind(&batch.source)
        .bind(&batch.target_table)
        .bind(batch.row_count)
        .bind(batch.status.as_str())
        .bind(batch.replay_of)
        .bind(batch.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
