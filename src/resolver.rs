//! Entity resolution: raw feed names to canonical identities.
//!
//! Stages run in strict order and short-circuit on the first success:
//!
//! ```text
//! raw name ── normalize ──► exact lookup ──► alias lookup ──► fuzzy scoring
//!                                │                │                │
//!                                └── conf 1.0     └── conf 0.95    └── conf = score
//!                                                          miss / ambiguous
//!                                                                 │
//!                                                        unresolved queue
//! ```
//!
//! Failing to resolve is an ordinary outcome, returned as a value. Only
//! store failures surface as errors.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{MatchContext, MatchType, NewUnresolved, Resolution, UnresolvedReason};
use crate::normalize::normalize_name;
use crate::ports::{IdentityStore, UnresolvedStore};
use crate::similarity::similarity;

/// Minimum fuzzy score the resolver will accept at all.
pub const FUZZY_ACCEPT_FLOOR: f64 = 0.75;

/// Stricter floor for callers that apply a match without human review.
/// The resolver itself only gates at [`FUZZY_ACCEPT_FLOOR`]; anything in
/// between is "resolvable but review before trusting".
pub const AUTO_APPLY_FLOOR: f64 = 0.85;

/// If the top two fuzzy scores are closer than this, refuse to guess.
pub const AMBIGUITY_GAP: f64 = 0.10;

const ALIAS_CONFIDENCE: f64 = 0.95;
const POSITION_BONUS: f64 = 0.10;
const TEAM_BONUS: f64 = 0.05;

enum FuzzyOutcome {
    Matched { identity_id: Uuid, confidence: f64 },
    Ambiguous,
    NoMatch,
}

/// Resolves feed names against the canonical identity store, queueing
/// failures for manual review. Stateless besides its store handles.
pub struct EntityResolver {
    identities: Arc<dyn IdentityStore>,
    unresolved: Arc<dyn UnresolvedStore>,
}

impl EntityResolver {
    pub fn new(identities: Arc<dyn IdentityStore>, unresolved: Arc<dyn UnresolvedStore>) -> Self {
        Self {
            identities,
            unresolved,
        }
    }

    /// Resolve one context. Deterministic for a fixed identity/alias
    /// snapshot; repeated calls return the same outcome.
    pub async fn resolve(&self, context: &MatchContext) -> Result<Resolution> {
        let normalized = normalize_name(&context.raw_name);
        if normalized.is_empty() {
            warn!(
                source = %context.source,
                raw_name = %context.raw_name,
                "raw name normalizes to empty, refusing lookup"
            );
            return Ok(Resolution::Unresolved {
                reason: UnresolvedReason::EmptyName,
            });
        }

        // Stage 1: exact normalized-name lookup, narrowed by hints.
        let exact_hits = self
            .identities
            .find_by_normalized_name(&normalized, context.position, context.team.as_deref())
            .await?;
        match exact_hits.as_slice() {
            [hit] => {
                return Ok(Resolution::Matched {
                    identity_id: hit.id,
                    confidence: 1.0,
                    match_type: MatchType::Exact,
                });
            }
            [] => {}
            hits => {
                // Several identities share this normalized name even after
                // filtering. Later stages may still disambiguate via a
                // curated alias.
                warn!(
                    raw_name = %context.raw_name,
                    candidates = hits.len(),
                    "exact lookup not unique, deferring"
                );
            }
        }

        // Stage 2: curated alias. No position/team filter; curation has
        // already disambiguated.
        if let Some(identity_id) = self.identities.find_alias(&normalized).await? {
            return Ok(Resolution::Matched {
                identity_id,
                confidence: ALIAS_CONFIDENCE,
                match_type: MatchType::Alias,
            });
        }

        // Stage 3: fuzzy scoring over the resolvable candidate pool.
        let reason = match self.fuzzy_stage(context).await? {
            FuzzyOutcome::Matched {
                identity_id,
                confidence,
            } => {
                return Ok(Resolution::Matched {
                    identity_id,
                    confidence,
                    match_type: MatchType::Fuzzy,
                });
            }
            FuzzyOutcome::Ambiguous => UnresolvedReason::Ambiguous,
            FuzzyOutcome::NoMatch => UnresolvedReason::NoMatch,
        };

        // Failure path: queue for review, deduplicated while open.
        self.register_unresolved(context).await?;
        Ok(Resolution::Unresolved { reason })
    }

    /// Resolve a sequence of contexts, keyed by raw name. Items are
    /// processed sequentially and independently; a store failure aborts
    /// the batch since nothing after it could be trusted either.
    pub async fn resolve_batch(
        &self,
        contexts: &[MatchContext],
    ) -> Result<HashMap<String, Resolution>> {
        let mut outcomes = HashMap::with_capacity(contexts.len());
        for context in contexts {
            let outcome = self.resolve(context).await?;
            outcomes.insert(context.raw_name.clone(), outcome);
        }
        Ok(outcomes)
    }

    /// Administrative action: close an open review row with the canonical
    /// identity it should have matched.
    pub async fn confirm_unresolved(&self, unresolved_id: Uuid, identity_id: Uuid) -> Result<bool> {
        let closed = self.unresolved.mark_resolved(unresolved_id, identity_id).await?;
        if closed {
            info!(%unresolved_id, %identity_id, "unresolved entity manually resolved");
        } else {
            warn!(%unresolved_id, "manual resolution targeted a missing or closed row");
        }
        Ok(closed)
    }

    async fn fuzzy_stage(&self, context: &MatchContext) -> Result<FuzzyOutcome> {
        let candidates = self.identities.fuzzy_candidates(context.position).await?;
        if candidates.is_empty() {
            return Ok(FuzzyOutcome::NoMatch);
        }

        let mut scored: Vec<(f64, Uuid)> = candidates
            .iter()
            .map(|candidate| {
                let mut score = similarity(&context.raw_name, &candidate.display_name);
                if context.position == Some(candidate.position) {
                    score += POSITION_BONUS;
                }
                if let (Some(hint), Some(team)) = (context.team.as_deref(), candidate.team.as_deref())
                {
                    if hint.eq_ignore_ascii_case(team) {
                        score += TEAM_BONUS;
                    }
                }
                (score.min(1.0), candidate.id)
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let (top_score, top_id) = scored[0];
        if top_score < FUZZY_ACCEPT_FLOOR {
            debug!(
                raw_name = %context.raw_name,
                top_score,
                "no fuzzy candidate reached the acceptance floor"
            );
            return Ok(FuzzyOutcome::NoMatch);
        }
        if let Some((runner_up, _)) = scored.get(1) {
            if top_score - runner_up < AMBIGUITY_GAP {
                warn!(
                    raw_name = %context.raw_name,
                    top_score,
                    runner_up,
                    "ambiguous fuzzy match refused"
                );
                return Ok(FuzzyOutcome::Ambiguous);
            }
        }
        Ok(FuzzyOutcome::Matched {
            identity_id: top_id,
            confidence: top_score,
        })
    }

    async fn register_unresolved(&self, context: &MatchContext) -> Result<()> {
        if let Some(existing) = self
            .unresolved
            .find_open(&context.raw_name, &context.source)
            .await?
        {
            debug!(
                raw_name = %context.raw_name,
                source = %context.source,
                unresolved_id = %existing.id,
                "unresolved entity already queued"
            );
            return Ok(());
        }
        let row = self
            .unresolved
            .insert_open(NewUnresolved::from_context(context))
            .await?;
        info!(
            raw_name = %context.raw_name,
            source = %context.source,
            unresolved_id = %row.id,
            "queued unresolved entity for review"
        );
        Ok(())
    }
}
