//! Domain types for the identity pipeline.
//!
//! `CanonicalIdentity` and `AliasEntry` are owned by the identity-management
//! and curation services; this pipeline only reads them. `UnresolvedEntity`
//! and the archive records are owned here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Roster positions recognized by the valuation backend, IDP included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    QB,
    RB,
    WR,
    TE,
    K,
    DEF,
    DL,
    LB,
    DB,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::QB => "QB",
            Position::RB => "RB",
            Position::WR => "WR",
            Position::TE => "TE",
            Position::K => "K",
            Position::DEF => "DEF",
            Position::DL => "DL",
            Position::LB => "LB",
            Position::DB => "DB",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "QB" => Some(Position::QB),
            "RB" => Some(Position::RB),
            "WR" => Some(Position::WR),
            "TE" => Some(Position::TE),
            "K" => Some(Position::K),
            "DEF" | "DST" => Some(Position::DEF),
            "DL" => Some(Position::DL),
            "LB" => Some(Position::LB),
            "DB" => Some(Position::DB),
            _ => None,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Player roster status as reported by the identity service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    Active,
    Inactive,
    InjuredReserve,
    PracticeSquad,
    Suspended,
    Retired,
    /// Known to the feed but not carried on any roster.
    Unlisted,
}

impl PlayerStatus {
    /// Whether fuzzy matching may consider a player with this status.
    /// Retired and unlisted players stay out of the candidate pool; their
    /// names collide too often with active players.
    pub fn is_resolvable(&self) -> bool {
        !matches!(self, PlayerStatus::Retired | PlayerStatus::Unlisted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerStatus::Active => "active",
            PlayerStatus::Inactive => "inactive",
            PlayerStatus::InjuredReserve => "injured_reserve",
            PlayerStatus::PracticeSquad => "practice_squad",
            PlayerStatus::Suspended => "suspended",
            PlayerStatus::Retired => "retired",
            PlayerStatus::Unlisted => "unlisted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(PlayerStatus::Active),
            "inactive" => Some(PlayerStatus::Inactive),
            "injured_reserve" | "ir" => Some(PlayerStatus::InjuredReserve),
            "practice_squad" => Some(PlayerStatus::PracticeSquad),
            "suspended" => Some(PlayerStatus::Suspended),
            "retired" => Some(PlayerStatus::Retired),
            "unlisted" => Some(PlayerStatus::Unlisted),
            _ => None,
        }
    }
}

/// The single authoritative record for one real-world player.
///
/// Identity (`id`) is immutable; descriptive attributes (`team`, `status`)
/// are owned by the identity-management service and may drift between
/// snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalIdentity {
    pub id: Uuid,
    /// Original casing, e.g. "A.J. Brown".
    pub display_name: String,
    /// Compact comparison key derived from `display_name`.
    pub normalized_name: String,
    pub position: Position,
    pub team: Option<String>,
    pub status: PlayerStatus,
}

/// Curated alias mapping: compact normalized alias to canonical identity.
/// Aliases are assumed already disambiguated by curation, so alias hits
/// skip position/team filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasEntry {
    pub normalized_alias: String,
    pub identity_id: Uuid,
}

/// One resolution request from an ingestion feed. Ephemeral; never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchContext {
    pub raw_name: String,
    pub position: Option<Position>,
    pub team: Option<String>,
    /// Tag identifying the origin feed, e.g. "sleeper" or "sportsdataio".
    pub source: String,
}

impl MatchContext {
    pub fn new(raw_name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            raw_name: raw_name.into(),
            position: None,
            team: None,
            source: source.into(),
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }
}

/// Which stage produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Alias,
    Fuzzy,
}

/// Why a resolution came back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// No candidate scored at or above the acceptance floor.
    NoMatch,
    /// Top two candidates were too close to call; refused rather than
    /// guessed.
    Ambiguous,
    /// The raw name normalized to an empty string.
    EmptyName,
}

/// Outcome of one resolution call. Not persisted; either consumed
/// immediately or reflected as an [`UnresolvedEntity`] row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    Matched {
        identity_id: Uuid,
        confidence: f64,
        match_type: MatchType,
    },
    Unresolved {
        reason: UnresolvedReason,
    },
}

impl Resolution {
    pub fn is_matched(&self) -> bool {
        matches!(self, Resolution::Matched { .. })
    }

    pub fn identity_id(&self) -> Option<Uuid> {
        match self {
            Resolution::Matched { identity_id, .. } => Some(*identity_id),
            Resolution::Unresolved { .. } => None,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Resolution::Matched { confidence, .. } => *confidence,
            Resolution::Unresolved { .. } => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedStatus {
    Open,
    Resolved,
}

/// A raw input name that could not be matched, queued for manual review.
/// Deduplicated by (raw_name, source) while open; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnresolvedEntity {
    pub id: Uuid,
    pub raw_name: String,
    pub position: Option<Position>,
    pub team: Option<String>,
    pub source: String,
    pub status: UnresolvedStatus,
    pub resolved_identity_id: Option<Uuid>,
    pub first_seen: DateTime<Utc>,
}

/// Insert payload for a new open review row.
#[derive(Debug, Clone)]
pub struct NewUnresolved {
    pub raw_name: String,
    pub position: Option<Position>,
    pub team: Option<String>,
    pub source: String,
}

impl NewUnresolved {
    pub fn from_context(context: &MatchContext) -> Self {
        Self {
            raw_name: context.raw_name.clone(),
            position: context.position,
            team: context.team.clone(),
            source: context.source.clone(),
        }
    }
}

/// Durable record of one raw ingestion batch, compressed and checksummed.
///
/// Never overwritten in place: a replay creates a brand-new ingestion under
/// a fresh batch id, and only `replay_count` / `last_replayed_at` on the
/// original ever move.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedBatch {
    pub batch_id: Uuid,
    pub source: String,
    pub target_table: String,
    #[serde(with = "serde_bytes_base64")]
    pub compressed_payload: Vec<u8>,
    pub row_count: i64,
    pub original_size: i64,
    pub compressed_size: i64,
    /// Hex sha-256 over the *uncompressed* serialized payload.
    pub checksum: String,
    pub can_replay: bool,
    pub replay_count: i64,
    pub last_replayed_at: Option<DateTime<Utc>>,
    pub archived_at: DateTime<Utc>,
}

/// Processing state for re-ingested raw rows and batch metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Pending,
    Complete,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "pending",
            ImportStatus::Complete => "complete",
            ImportStatus::Failed => "failed",
        }
    }
}

/// Bookkeeping row created for every ingestion, replays included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatch {
    pub batch_id: Uuid,
    pub source: String,
    pub target_table: String,
    pub row_count: i64,
    pub status: ImportStatus,
    /// Present when this ingestion was produced by replaying an archive.
    pub replay_of: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Base64 (de)serialization for binary payloads so archived batches stay
/// JSON-representable in fixtures and admin tooling.
mod serde_bytes_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_parse_round_trip() {
        for p in [
            Position::QB,
            Position::RB,
            Position::WR,
            Position::TE,
            Position::K,
            Position::DEF,
            Position::DL,
            Position::LB,
            Position::DB,
        ] {
            assert_eq!(Position::parse(p.as_str()), Some(p));
        }
        assert_eq!(Position::parse("dst"), Some(Position::DEF));
        assert_eq!(Position::parse("OL"), None);
    }

    #[test]
    fn retired_and_unlisted_are_not_resolvable() {
        assert!(!PlayerStatus::Retired.is_resolvable());
        assert!(!PlayerStatus::Unlisted.is_resolvable());
        assert!(PlayerStatus::Active.is_resolvable());
        assert!(PlayerStatus::InjuredReserve.is_resolvable());
        assert!(PlayerStatus::PracticeSquad.is_resolvable());
    }

    #[test]
    fn match_context_builder() {
        let context = MatchContext::new("AJ Brown", "sleeper")
            .with_position(Position::WR)
            .with_team("PHI");
        assert_eq!(context.raw_name, "AJ Brown");
        assert_eq!(context.position, Some(Position::WR));
        assert_eq!(context.team.as_deref(), Some("PHI"));
        assert_eq!(context.source, "sleeper");
    }

    #[test]
    fn archived_batch_payload_survives_json() {
        let batch = ArchivedBatch {
            batch_id: Uuid::new_v4(),
            source: "sleeper".into(),
            target_table: "raw_projections".into(),
            compressed_payload: vec![0, 1, 2, 250, 251, 252],
            row_count: 2,
            original_size: 6,
            compressed_size: 6,
            checksum: "deadbeef".into(),
            can_replay: true,
            replay_count: 0,
            last_replayed_at: None,
            archived_at: Utc::now(),
        };
        let json = serde_json::to_string(&batch).unwrap();
        let parsed: ArchivedBatch = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.compressed_payload, batch.compressed_payload);
    }
}
