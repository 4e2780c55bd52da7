//! Durable archive of raw ingestion batches, with replay.
//!
//! Every batch that enters the pipeline is serialized, checksummed,
//! compressed, and kept forever. When matching or valuation logic changes,
//! an operator replays a stored batch through the normal ingestion path
//! under a brand-new batch id, with no refetch from the original source, and
//! the original archive row survives untouched apart from its replay
//! counters, so provenance is preserved for every generation.
//!
//! The checksum is defined over the *uncompressed* serialized payload: it
//! is verified after decompression at replay time, which keeps it
//! meaningful regardless of the codec in front of it.

use std::io::{Read, Write};
use std::sync::Arc;

use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::model::{ArchivedBatch, ImportBatch, ImportStatus};
use crate::ports::ArchiveStore;

/// Page bound for `list_replayable`.
pub const REPLAY_PAGE_SIZE: i64 = 50;

/// Outcome of a successful replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReceipt {
    pub new_batch_id: Uuid,
    pub rows_processed: usize,
}

pub struct ReplayArchive {
    store: Arc<dyn ArchiveStore>,
    page_size: i64,
}

impl ReplayArchive {
    pub fn new(store: Arc<dyn ArchiveStore>) -> Self {
        Self {
            store,
            page_size: REPLAY_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Compress and persist one raw batch.
    pub async fn archive(
        &self,
        batch_id: Uuid,
        source: &str,
        target_table: &str,
        rows: &[serde_json::Value],
    ) -> Result<()> {
        let payload = serde_json::to_vec(rows)?;
        let checksum = sha256_hex(&payload);
        let compressed = compress(&payload)?;
        let batch = ArchivedBatch {
            batch_id,
            source: source.to_string(),
            target_table: target_table.to_string(),
            row_count: rows.len() as i64,
            original_size: payload.len() as i64,
            compressed_size: compressed.len() as i64,
            compressed_payload: compressed,
            checksum,
            can_replay: true,
            replay_count: 0,
            last_replayed_at: None,
            archived_at: Utc::now(),
        };
        let (original_size, compressed_size) = (batch.original_size, batch.compressed_size);
        self.store.insert_batch(batch).await?;
        info!(
            %batch_id,
            source,
            target_table,
            rows = rows.len(),
            original_size,
            compressed_size,
            "archived raw batch"
        );
        Ok(())
    }

    /// Re-ingest an archived batch under a fresh batch id.
    ///
    /// Refuses missing, non-replayable, and corrupt archives; a corrupt
    /// archive never partially ingests. On success the rows land in the
    /// original target table with fresh row ids and pending status, a
    /// matching batch-metadata row is written, and the original's replay
    /// counters move.
    pub async fn replay(&self, batch_id: Uuid) -> Result<ReplayReceipt> {
        let batch = self
            .store
            .fetch_batch(batch_id)
            .await?
            .ok_or(PipelineError::ArchiveNotFound(batch_id))?;
        if !batch.can_replay {
            warn!(%batch_id, "replay refused: batch marked non-replayable");
            return Err(PipelineError::NotReplayable(batch_id));
        }

        let payload = decompress(&batch.compressed_payload)?;
        let actual = sha256_hex(&payload);
        if actual != batch.checksum {
            error!(
                %batch_id,
                expected = %batch.checksum,
                actual = %actual,
                "archived batch checksum mismatch, refusing replay"
            );
            return Err(PipelineError::ArchiveCorrupted {
                batch_id,
                expected: batch.checksum,
                actual,
            });
        }

        let rows: Vec<serde_json::Value> = serde_json::from_slice(&payload)?;
        let new_batch_id = Uuid::new_v4();
        let inserted = self
            .store
            .insert_raw_rows(new_batch_id, &batch.target_table, &rows)
            .await?;
        self.store
            .insert_import_batch(ImportBatch {
                batch_id: new_batch_id,
                source: batch.source.clone(),
                target_table: batch.target_table.clone(),
                row_count: inserted as i64,
                status: ImportStatus::Pending,
                replay_of: Some(batch_id),
                created_at: Utc::now(),
            })
            .await?;
        self.store.record_replay(batch_id, Utc::now()).await?;
        info!(
            original = %batch_id,
            %new_batch_id,
            rows = inserted,
            "replayed archived batch"
        );
        Ok(ReplayReceipt {
            new_batch_id,
            rows_processed: inserted,
        })
    }

    /// One-way switch for archives known to be corrupt or poisoned.
    /// There is no re-enable operation; undoing this is a deliberate
    /// operator-level data correction, not a pipeline call.
    pub async fn mark_non_replayable(&self, batch_id: Uuid, reason: &str) -> Result<()> {
        let found = self.store.set_non_replayable(batch_id).await?;
        if !found {
            return Err(PipelineError::ArchiveNotFound(batch_id));
        }
        warn!(%batch_id, reason, "archive marked non-replayable");
        Ok(())
    }

    /// Batches still eligible for replay, most recently archived first.
    pub async fn list_replayable(&self) -> Result<Vec<ArchivedBatch>> {
        self.store.list_replayable(self.page_size).await
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn compress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

fn decompress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryArchiveStore;

    fn sample_rows() -> Vec<serde_json::Value> {
        vec![
            serde_json::json!({"name": "A.J. Brown", "position": "WR", "team": "PHI", "points": 287.5}),
            serde_json::json!({"name": "Bijan Robinson", "position": "RB", "team": "ATL", "points": 301.2}),
            serde_json::json!({"name": "J. Smith", "position": "RB", "team": null, "points": 44.0}),
        ]
    }

    fn archive_over(store: Arc<MemoryArchiveStore>) -> ReplayArchive {
        ReplayArchive::new(store)
    }

    #[test]
    fn compression_round_trips() {
        let payload = br#"[{"name":"A.J. Brown"}]"#;
        let compressed = compress(payload).unwrap();
        assert_eq!(decompress(&compressed).unwrap(), payload);
    }

    #[tokio::test]
    async fn archive_records_sizes_and_checksum() {
        let store = Arc::new(MemoryArchiveStore::default());
        let archive = archive_over(store.clone());
        let batch_id = Uuid::new_v4();

        archive
            .archive(batch_id, "sleeper", "raw_projections", &sample_rows())
            .await
            .unwrap();

        let stored = store.fetch_batch(batch_id).await.unwrap().unwrap();
        assert_eq!(stored.row_count, 3);
        assert!(stored.can_replay);
        assert_eq!(stored.replay_count, 0);
        assert!(stored.original_size > 0);
        assert!(stored.compressed_size > 0);
        assert_eq!(stored.checksum.len(), 64);
    }

    #[tokio::test]
    async fn replay_reproduces_rows_under_a_new_batch_id() {
        let store = Arc::new(MemoryArchiveStore::default());
        let archive = archive_over(store.clone());
        let batch_id = Uuid::new_v4();
        let rows = sample_rows();

        archive
            .archive(batch_id, "sleeper", "raw_projections", &rows)
            .await
            .unwrap();
        let receipt = archive.replay(batch_id).await.unwrap();

        assert_ne!(receipt.new_batch_id, batch_id);
        assert_eq!(receipt.rows_processed, rows.len());
        assert_eq!(store.raw_row_count(receipt.new_batch_id).await, rows.len());

        let meta = store.import_batches().await;
        assert_eq!(meta.len(), 1);
        assert_eq!(meta[0].batch_id, receipt.new_batch_id);
        assert_eq!(meta[0].status, ImportStatus::Pending);
        assert_eq!(meta[0].replay_of, Some(batch_id));

        let original = store.fetch_batch(batch_id).await.unwrap().unwrap();
        assert_eq!(original.replay_count, 1);
        assert!(original.last_replayed_at.is_some());
    }

    #[tokio::test]
    async fn replay_twice_yields_two_distinct_generations() {
        let store = Arc::new(MemoryArchiveStore::default());
        let archive = archive_over(store.clone());
        let batch_id = Uuid::new_v4();

        archive
            .archive(batch_id, "ktc", "raw_values", &sample_rows())
            .await
            .unwrap();
        let first = archive.replay(batch_id).await.unwrap();
        let second = archive.replay(batch_id).await.unwrap();

        assert_ne!(first.new_batch_id, second.new_batch_id);
        let original = store.fetch_batch(batch_id).await.unwrap().unwrap();
        assert_eq!(original.replay_count, 2);
    }

    #[tokio::test]
    async fn replay_of_missing_batch_is_not_found() {
        let archive = archive_over(Arc::new(MemoryArchiveStore::default()));
        let err = archive.replay(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PipelineError::ArchiveNotFound(_)));
    }

    #[tokio::test]
    async fn non_replayable_batch_always_refuses_and_ingests_nothing() {
        let store = Arc::new(MemoryArchiveStore::default());
        let archive = archive_over(store.clone());
        let batch_id = Uuid::new_v4();

        archive
            .archive(batch_id, "sleeper", "raw_projections", &sample_rows())
            .await
            .unwrap();
        archive
            .mark_non_replayable(batch_id, "payload poisoned upstream")
            .await
            .unwrap();

        for _ in 0..2 {
            let err = archive.replay(batch_id).await.unwrap_err();
            assert!(matches!(err, PipelineError::NotReplayable(_)));
        }
        assert_eq!(store.total_raw_rows().await, 0);
        assert!(store.import_batches().await.is_empty());
    }

    #[tokio::test]
    async fn corrupted_payload_is_refused_with_named_mismatch() {
        let store = Arc::new(MemoryArchiveStore::default());
        let archive = archive_over(store.clone());
        let batch_id = Uuid::new_v4();

        archive
            .archive(batch_id, "sleeper", "raw_projections", &sample_rows())
            .await
            .unwrap();
        store.corrupt_checksum_for_test(batch_id).await;

        let err = archive.replay(batch_id).await.unwrap_err();
        match err {
            PipelineError::ArchiveCorrupted {
                batch_id: id,
                expected,
                actual,
            } => {
                assert_eq!(id, batch_id);
                assert_ne!(expected, actual);
            }
            other => panic!("expected corruption failure, got {other:?}"),
        }
        assert_eq!(store.total_raw_rows().await, 0);
    }

    #[tokio::test]
    async fn list_replayable_is_bounded_and_newest_first() {
        let store = Arc::new(MemoryArchiveStore::default());
        let archive = archive_over(store.clone()).with_page_size(2);

        let mut ids = Vec::new();
        for n in 0..3 {
            let id = Uuid::new_v4();
            archive
                .archive(id, "sleeper", "raw_projections", &sample_rows()[..n + 1])
                .await
                .unwrap();
            ids.push(id);
        }
        archive
            .mark_non_replayable(ids[1], "known bad")
            .await
            .unwrap();

        let listed = archive.list_replayable().await.unwrap();
        assert_eq!(listed.len(), 2);
        // newest first, disabled batch excluded
        assert_eq!(listed[0].batch_id, ids[2]);
        assert_eq!(listed[1].batch_id, ids[0]);
        assert!(listed.iter().all(|b| b.can_replay));
    }
}
