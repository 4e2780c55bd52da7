//! Canonical identity resolution and data integrity pipeline.
//!
//! The valuation backend ingests player data from feeds that all spell
//! names differently. This crate is the machinery between those feeds and
//! the canonical value data the product serves:
//!
//! 1. **Resolution**: map a free-text name (plus optional position/team
//!    hints) to exactly one canonical identity, or queue it for review
//!    ([`resolver::EntityResolver`]).
//! 2. **Integrity**: checksum and seal every canonical value bundle
//!    before it reaches a consumer, and detect any alteration
//!    ([`integrity::IntegrityGuard`]).
//! 3. **Replay**: archive every raw batch compressed and checksummed so
//!    history can be reprocessed when matching or valuation logic changes
//!    ([`archive::ReplayArchive`]).
//!
//! Persistence is behind the port traits in [`ports`]; services take their
//! stores as explicit `Arc<dyn ...>` dependencies. The `database` feature
//! adds Postgres implementations.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use gridiron_pipeline::model::MatchContext;
//! use gridiron_pipeline::resolver::EntityResolver;
//! use gridiron_pipeline::store::memory::{MemoryIdentityStore, MemoryUnresolvedStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> gridiron_pipeline::Result<()> {
//! let resolver = EntityResolver::new(
//!     Arc::new(MemoryIdentityStore::empty()),
//!     Arc::new(MemoryUnresolvedStore::default()),
//! );
//! let outcome = resolver
//!     .resolve(&MatchContext::new("A.J. Brown", "sleeper"))
//!     .await?;
//! assert!(!outcome.is_matched());
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Explicit configuration values
pub mod config;

// Domain types
pub mod model;

// Pure text machinery
pub mod normalize;
pub mod similarity;

// Storage ports and their implementations
pub mod ports;
pub mod store;

// Pipeline services
pub mod archive;
pub mod integrity;
pub mod resolver;

// Public re-exports for the common path
pub use config::{GuardMode, PipelineConfig};
pub use error::{PipelineError, Result};
pub use integrity::{ChecksumReport, IntegrityGuard, SealedValueBundle, ValueBundle};
pub use model::{MatchContext, MatchType, Resolution, UnresolvedReason};
pub use resolver::EntityResolver;
pub use archive::{ReplayArchive, ReplayReceipt};
